//! 分析维度测试
//!
//! 覆盖时间分片求和、网格层级不变式、检索的三次读取上界和
//! recent-targets 维度。

use std::sync::Arc;

use gridlink::analytics::{PopularDomains, RecentTargets, TimeShardedCounter};
use gridlink::services::UrlRecord;
use gridlink::storage::{MemoryStorage, NamespacedStorage, Storage, StorageId};

const HOUR: i64 = 3600;

fn record(url: &str, created_ts: i64, code: &str) -> UrlRecord {
    UrlRecord {
        code: code.to_string(),
        url: url.to_string(),
        host: "sho.rt".to_string(),
        created_ts,
        remote_addr: None,
        remote_port: None,
    }
}

#[cfg(test)]
mod time_shard_tests {
    use super::*;

    /// 手算夹具：d1 在 00:00/01:00/02:00/03:00 四个分片里分别有
    /// 2/3/4/5 次，d2 有 6/7/0/8 次。
    async fn seeded_counter() -> TimeShardedCounter {
        let counter =
            TimeShardedCounter::new(Arc::new(MemoryStorage::new()), HOUR, "domain");
        for (shard_index, events) in [(0, 2), (1, 3), (2, 4), (3, 5)] {
            for _ in 0..events {
                counter
                    .register(shard_index * HOUR + 900, "d1")
                    .await
                    .unwrap();
            }
        }
        for (shard_index, events) in [(0, 6), (1, 7), (2, 0), (3, 8)] {
            for _ in 0..events {
                counter
                    .register(shard_index * HOUR + 2640, "d2")
                    .await
                    .unwrap();
            }
        }
        counter
    }

    #[tokio::test]
    async fn lookback_sums_the_closed_shard_range() {
        let counter = seeded_counter().await;
        // 03:13，回看 2 小时 => 01:00 + 02:00 + 03:00
        assert_eq!(counter.retrieve("d1", 11580, 2 * HOUR).await.unwrap(), 12);
        assert_eq!(counter.retrieve("d2", 11580, 2 * HOUR).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn earlier_now_shifts_the_window() {
        let counter = seeded_counter().await;
        // 02:44，回看 2 小时 => 00:00 + 01:00 + 02:00
        assert_eq!(counter.retrieve("d1", 9840, 2 * HOUR).await.unwrap(), 9);
        assert_eq!(counter.retrieve("d2", 9840, 2 * HOUR).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn absent_shards_count_as_zero() {
        let counter = seeded_counter().await;
        assert_eq!(counter.retrieve("d9", 11580, 2 * HOUR).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn register_reports_the_shard_local_value() {
        let counter = TimeShardedCounter::new(Arc::new(MemoryStorage::new()), HOUR, "key");
        assert_eq!(counter.register(10, "k").await.unwrap(), 1);
        assert_eq!(counter.register(20, "k").await.unwrap(), 2);
        // 新的分片从零开始
        assert_eq!(counter.register(HOUR + 1, "k").await.unwrap(), 1);
    }
}

#[cfg(test)]
mod popular_domains_tests {
    use super::*;

    fn grid(storage: Arc<MemoryStorage>, thresholds: Vec<i64>, fanout: i64) -> PopularDomains {
        let wrap = |ns: &str| -> Arc<dyn Storage> {
            Arc::new(NamespacedStorage::new(storage.clone(), ns))
        };
        PopularDomains::with_settings(
            wrap("pd_counters"),
            wrap("pd_levels"),
            wrap("pd_members"),
            HOUR,
            thresholds,
            fanout,
        )
    }

    async fn register_times(dim: &PopularDomains, url: &str, times: usize) {
        for i in 0..times {
            dim.register(&record(url, 1000, &format!("c{i}")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn end_to_end_top_domains() {
        let storage = Arc::new(MemoryStorage::new());
        let dim = grid(storage, vec![0, 5, 10], 1);
        register_times(&dim, "http://a.com/page", 12).await;
        register_times(&dim, "http://b.com/page", 7).await;

        // a.com 的成员数已满足 n=1，走最高层就够了
        let tops = dim.retrieve(1, 1000, HOUR).await.unwrap();
        assert_eq!(tops.len(), 1);
        assert_eq!(tops[0].domain, "a.com");
        assert_eq!(tops[0].count, 12);

        let tops = dim.retrieve(2, 1000, HOUR).await.unwrap();
        assert_eq!(
            tops.iter()
                .map(|t| (t.domain.as_str(), t.count))
                .collect::<Vec<_>>(),
            vec![("a.com", 12), ("b.com", 7)]
        );
    }

    #[tokio::test]
    async fn membership_is_cumulative_downward() {
        let storage = Arc::new(MemoryStorage::new());
        let dim = grid(storage.clone(), vec![0, 5, 10], 1);
        register_times(&dim, "http://a.com/", 12).await;
        register_times(&dim, "http://b.com/", 7).await;

        let members = NamespacedStorage::new(storage, "pd_members");
        let shard = (1000 / HOUR) * HOUR;
        let level1 = members
            .fetch(&StorageId::compound([
                ("time_shard", shard.to_string()),
                ("grid_level", "1".to_string()),
            ]))
            .await
            .unwrap();
        let level2 = members
            .fetch(&StorageId::compound([
                ("time_shard", shard.to_string()),
                ("grid_level", "2".to_string()),
            ]))
            .await
            .unwrap();

        // 升到第 2 层的域名仍留在第 1 层的名单里
        let level1_members = level1.get("value").unwrap();
        assert!(level1_members.contains(":::a.com"));
        assert!(level1_members.contains(":::b.com"));
        assert_eq!(level2.get("value"), Some(":::a.com"));
    }

    #[tokio::test]
    async fn counters_below_the_first_threshold_stay_out_of_the_grid() {
        let storage = Arc::new(MemoryStorage::new());
        let dim = grid(storage.clone(), vec![0, 5, 10], 1);
        register_times(&dim, "http://quiet.org/", 4).await;

        let members = NamespacedStorage::new(storage, "pd_members");
        let shard = (1000 / HOUR) * HOUR;
        let level1 = members
            .fetch(&StorageId::compound([
                ("time_shard", shard.to_string()),
                ("grid_level", "1".to_string()),
            ]))
            .await;
        assert!(level1.is_err());

        // 域名计数本身照常累积
        let tops = dim.retrieve(1, 1000, HOUR).await.unwrap();
        assert!(tops.is_empty());
    }

    #[tokio::test]
    async fn retrieve_issues_exactly_three_multi_fetches() {
        let storage = Arc::new(MemoryStorage::new());
        let dim = grid(storage.clone(), vec![0, 5, 10], 3);

        for population in [1usize, 60] {
            for d in 0..population {
                register_times(&dim, &format!("http://site{d}.example/"), 6).await;
            }
            let before = storage.stats().multi_fetches;
            dim.retrieve(5, 1000, 3 * HOUR).await.unwrap();
            let after = storage.stats().multi_fetches;
            assert_eq!(after - before, 3);
        }
    }

    #[tokio::test]
    async fn totals_span_multiple_shards() {
        let storage = Arc::new(MemoryStorage::new());
        let dim = grid(storage, vec![0, 5, 10], 1);
        // 两个相邻分片各 6 次，窗口覆盖两个分片时合计 12
        for i in 0..6 {
            dim.register(&record("http://a.com/", 1000, &format!("x{i}")))
                .await
                .unwrap();
        }
        for i in 0..6 {
            dim.register(&record("http://a.com/", 1000 + HOUR, &format!("y{i}")))
                .await
                .unwrap();
        }

        let tops = dim.retrieve(1, 1000 + HOUR, HOUR).await.unwrap();
        assert_eq!(tops[0].count, 12);
    }

    #[tokio::test]
    async fn www_prefixes_collapse_into_one_domain() {
        let storage = Arc::new(MemoryStorage::new());
        let dim = grid(storage, vec![0, 2, 10], 1);
        for (i, url) in ["http://a.com/", "http://www.a.com/", "http://A.COM:8080/"]
            .iter()
            .enumerate()
        {
            dim.register(&record(url, 1000, &format!("w{i}"))).await.unwrap();
        }
        let tops = dim.retrieve(1, 1000, HOUR).await.unwrap();
        assert_eq!(tops[0].domain, "a.com");
        assert_eq!(tops[0].count, 3);
    }
}

#[cfg(test)]
mod recent_targets_tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn retrieve_returns_newest_first() {
        let dimension = RecentTargets::new(Arc::new(MemoryStorage::new()));
        for (code, url) in [("one", "http://a.com/1"), ("two", "http://b.com/2"), ("three", "http://c.com/3")] {
            dimension.register(&record(url, 1000, code)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let latest = dimension.retrieve(2).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].code, "three");
        assert_eq!(latest[1].code, "two");
    }

    #[tokio::test]
    async fn namespaced_dimensions_stay_isolated() {
        let inner = Arc::new(MemoryStorage::new());
        let left = RecentTargets::new(Arc::new(NamespacedStorage::new(inner.clone(), "left")));
        let right = RecentTargets::new(Arc::new(NamespacedStorage::new(inner, "right")));

        left.register(&record("http://a.com/", 1000, "a")).await.unwrap();
        right.register(&record("http://b.com/", 1000, "b")).await.unwrap();

        let rows = left.retrieve(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code, "a");
    }
}
