//! 生成器与序列测试

use std::sync::Arc;

use gridlink::errors::GridlinkError;
use gridlink::generator::{CentralizedGenerator, FakeGenerator, Generator, Sequence};
use gridlink::storage::MemoryStorage;

fn sequence_over(letters: &str) -> Sequence {
    Sequence::new(Arc::new(MemoryStorage::new()), "seq").with_letters(letters)
}

#[cfg(test)]
mod sequence_tests {
    use super::*;

    #[tokio::test]
    async fn values_follow_the_bijective_successor_order() {
        let seq = sequence_over("ab");
        let mut produced = Vec::new();
        for _ in 0..5 {
            produced.push(seq.generate().await.unwrap());
        }
        assert_eq!(produced, vec!["a", "b", "aa", "ab", "ba"]);
    }

    #[tokio::test]
    async fn min_length_seeds_the_first_value() {
        let seq = sequence_over("ab").with_lengths(3, 1024);
        assert_eq!(seq.generate().await.unwrap(), "aaa");
        assert_eq!(seq.generate().await.unwrap(), "aab");
    }

    #[tokio::test]
    async fn state_survives_across_sequence_instances() {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let first = Sequence::new(storage.clone(), "shared").with_letters("ab");
        assert_eq!(first.generate().await.unwrap(), "a");
        drop(first);

        let second = Sequence::new(storage, "shared").with_letters("ab");
        assert_eq!(second.generate().await.unwrap(), "b");
    }

    #[tokio::test]
    async fn depletion_surfaces_and_stays_terminal() {
        let seq = sequence_over("ab").with_lengths(1, 2);
        for expected in ["a", "b", "aa", "ab", "ba", "bb"] {
            assert_eq!(seq.generate().await.unwrap(), expected);
        }
        assert!(matches!(
            seq.generate().await,
            Err(GridlinkError::SequenceDepleted(_))
        ));
        // 耗尽不是暂时状态，再试还是一样
        assert!(matches!(
            seq.generate().await,
            Err(GridlinkError::SequenceDepleted(_))
        ));
    }

    #[tokio::test]
    async fn prohibited_values_are_skipped() {
        let seq = sequence_over("ab").with_prohibit(Arc::new(|value| value.contains("ab")));
        let mut produced = Vec::new();
        for _ in 0..5 {
            produced.push(seq.generate().await.unwrap());
        }
        // "ab" 被谓词挡住，序列直接跳到下一个干净值
        assert_eq!(produced, vec!["a", "b", "aa", "ba", "bb"]);
    }

    #[tokio::test]
    async fn default_alphabet_starts_from_lowercase() {
        let seq = Sequence::new(Arc::new(MemoryStorage::new()), "seq");
        assert_eq!(seq.generate().await.unwrap(), "a");
        assert_eq!(seq.generate().await.unwrap(), "b");
    }
}

#[cfg(test)]
mod generator_tests {
    use super::*;

    #[tokio::test]
    async fn fake_generator_counts_per_instance() {
        let left = FakeGenerator::new();
        let right = FakeGenerator::new();
        assert_eq!(left.generate().await.unwrap(), "1");
        assert_eq!(left.generate().await.unwrap(), "2");
        // 计数器属于实例，互不影响
        assert_eq!(right.generate().await.unwrap(), "1");
    }

    #[tokio::test]
    async fn centralized_generator_delegates_to_its_sequence() {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let generator =
            CentralizedGenerator::with_sequence(Sequence::new(storage, "codes").with_letters("ab"));
        assert_eq!(generator.generate().await.unwrap(), "a");
        assert_eq!(generator.generate().await.unwrap(), "b");
        assert_eq!(generator.generate().await.unwrap(), "aa");
    }
}
