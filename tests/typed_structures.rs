//! Behavior of every typed structure wrapper against the in-memory transport.

use redis_typed::{
    Connection, ConnectionConfig, GeoEntry, GeoUnit, MemoryTransport, RedisDictionary, RedisGeo,
    RedisHyperLogLog, RedisList, RedisLock, RedisSet, RedisSortedSet, RedisString,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn memory_connection() -> Connection {
    Connection::new(ConnectionConfig::default(), MemoryTransport::new().factory())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: u32,
    label: String,
}

fn item(id: u32) -> Item {
    Item {
        id,
        label: format!("item-{id}"),
    }
}

mod string {
    use super::*;

    #[tokio::test]
    async fn get_or_set_runs_factory_only_on_miss() {
        let connection = memory_connection();
        let handle = RedisString::<String>::new(&connection, "cached");

        let first = handle
            .get_or_set(|| "computed".to_string(), None)
            .await
            .unwrap();
        assert_eq!(first, "computed");

        // Hit: the factory must not run again.
        let second = handle
            .get_or_set(|| panic!("factory must not run on a hit"), None)
            .await
            .unwrap();
        assert_eq!(second, "computed");
    }

    #[tokio::test]
    async fn get_or_set_with_async_factory() {
        let connection = memory_connection();
        let handle = RedisString::<i64>::new(&connection, "async-cached");
        let value = handle.get_or_set_with(|| async { 17 }, None).await.unwrap();
        assert_eq!(value, 17);
        assert_eq!(handle.get().await.unwrap().into_option(), Some(17));
    }

    #[tokio::test]
    async fn set_if_not_exists_only_wins_once() {
        let connection = memory_connection();
        let handle = RedisString::<i64>::new(&connection, "nx");
        assert!(handle.set_if_not_exists(&1, None).await.unwrap());
        assert!(!handle.set_if_not_exists(&2, None).await.unwrap());
        assert_eq!(handle.get().await.unwrap().into_option(), Some(1));
    }

    #[tokio::test]
    async fn get_and_set_returns_previous_value() {
        let connection = memory_connection();
        let handle = RedisString::<String>::new(&connection, "swap");
        assert!(!handle
            .get_and_set(&"first".to_string(), None)
            .await
            .unwrap()
            .has_value());
        let previous = handle
            .get_and_set(&"second".to_string(), None)
            .await
            .unwrap();
        assert_eq!(previous.into_option(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn increment_and_append() {
        let connection = memory_connection();
        let counter = RedisString::<i64>::new(&connection, "counter");
        assert_eq!(counter.increment(None).await.unwrap(), 1);
        assert_eq!(counter.increment_by(9, None).await.unwrap(), 10);
        assert_eq!(counter.decrement(None).await.unwrap(), 9);

        let float = RedisString::<f64>::new(&connection, "float");
        assert_eq!(float.increment_float(0.5, None).await.unwrap(), 0.5);
        assert_eq!(float.increment_float(1.0, None).await.unwrap(), 1.5);

        let text = RedisString::<String>::new(&connection, "text");
        text.set(&"ab".to_string(), None).await.unwrap();
        assert_eq!(text.append(&"cd".to_string(), None).await.unwrap(), 4);
        assert_eq!(
            text.get().await.unwrap().into_option(),
            Some("abcd".to_string())
        );
    }

    #[tokio::test]
    async fn delete_and_exists() {
        let connection = memory_connection();
        let handle = RedisString::<i64>::new(&connection, "k");
        assert!(!handle.exists().await.unwrap());
        assert!(!handle.delete().await.unwrap());
        handle.set(&1, None).await.unwrap();
        assert!(handle.exists().await.unwrap());
        assert!(handle.delete().await.unwrap());
        assert!(!handle.exists().await.unwrap());
    }
}

mod list {
    use super::*;

    #[tokio::test]
    async fn push_pop_preserves_order() {
        let connection = memory_connection();
        let list = RedisList::<Item>::new(&connection, "items");

        list.push_back_many(&[item(1), item(2)], None).await.unwrap();
        list.push_front(&item(0), None).await.unwrap();
        assert_eq!(list.len().await.unwrap(), 3);

        assert_eq!(
            list.range(0, -1).await.unwrap(),
            vec![item(0), item(1), item(2)]
        );
        assert_eq!(list.pop_front().await.unwrap().into_option(), Some(item(0)));
        assert_eq!(list.pop_back().await.unwrap().into_option(), Some(item(2)));
    }

    #[tokio::test]
    async fn negative_indices_count_from_the_end() {
        let connection = memory_connection();
        let list = RedisList::<i64>::new(&connection, "nums");
        list.push_back_many(&[10, 20, 30, 40], None).await.unwrap();

        assert_eq!(list.index(-1).await.unwrap().into_option(), Some(40));
        assert_eq!(list.range(-2, -1).await.unwrap(), vec![30, 40]);
        assert_eq!(list.range(1, 2).await.unwrap(), vec![20, 30]);
        // Start beyond stop resolves to empty, not an error.
        assert!(list.range(3, 1).await.unwrap().is_empty());
        assert!(list.range(10, 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_relative_to_pivot() {
        let connection = memory_connection();
        let list = RedisList::<i64>::new(&connection, "nums");
        list.push_back_many(&[1, 3], None).await.unwrap();

        assert_eq!(list.insert_before(&3, &2, None).await.unwrap(), 3);
        assert_eq!(list.insert_after(&3, &4, None).await.unwrap(), 4);
        assert_eq!(list.range(0, -1).await.unwrap(), vec![1, 2, 3, 4]);

        // Missing pivot reports -1 and leaves the list unchanged.
        assert_eq!(list.insert_before(&99, &0, None).await.unwrap(), -1);
        assert_eq!(list.len().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn remove_honors_count_direction() {
        let connection = memory_connection();
        let list = RedisList::<i64>::new(&connection, "dups");
        list.push_back_many(&[1, 2, 1, 2, 1], None).await.unwrap();

        // Remove one occurrence from the head.
        assert_eq!(list.remove(&1, 1).await.unwrap(), 1);
        assert_eq!(list.range(0, -1).await.unwrap(), vec![2, 1, 2, 1]);

        // Remove one occurrence from the tail.
        assert_eq!(list.remove(&2, -1).await.unwrap(), 1);
        assert_eq!(list.range(0, -1).await.unwrap(), vec![2, 1, 1]);

        // Remove every remaining occurrence.
        assert_eq!(list.remove(&1, 0).await.unwrap(), 2);
        assert_eq!(list.range(0, -1).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn trim_and_set_at() {
        let connection = memory_connection();
        let list = RedisList::<i64>::new(&connection, "nums");
        list.push_back_many(&[1, 2, 3, 4, 5], None).await.unwrap();

        list.set_at(0, &9, None).await.unwrap();
        assert_eq!(list.index(0).await.unwrap().into_option(), Some(9));
        assert!(list.set_at(50, &0, None).await.is_err());

        list.trim(1, 3, None).await.unwrap();
        assert_eq!(list.range(0, -1).await.unwrap(), vec![2, 3, 4]);
    }
}

mod set {
    use super::*;

    #[tokio::test]
    async fn membership_is_field_presence() {
        let connection = memory_connection();
        let set = RedisSet::<Item>::new(&connection, "members");

        assert!(set.add(&item(1), None).await.unwrap());
        assert!(!set.add(&item(1), None).await.unwrap());
        assert_eq!(set.add_many(&[item(1), item(2), item(3)], None).await.unwrap(), 2);

        assert!(set.contains(&item(2)).await.unwrap());
        assert!(!set.contains(&item(9)).await.unwrap());
        assert_eq!(set.len().await.unwrap(), 3);

        assert!(set.remove(&item(2)).await.unwrap());
        assert!(!set.remove(&item(2)).await.unwrap());

        let mut members = set.members().await.unwrap();
        members.sort_by_key(|m| m.id);
        assert_eq!(members, vec![item(1), item(3)]);
    }
}

mod dictionary {
    use super::*;

    #[tokio::test]
    async fn field_level_operations() {
        let connection = memory_connection();
        let dict = RedisDictionary::<String, Item>::new(&connection, "inventory");

        assert!(dict.set(&"a".to_string(), &item(1), None).await.unwrap());
        assert!(!dict.set(&"a".to_string(), &item(11), None).await.unwrap());
        dict.set_many(
            &[("b".to_string(), item(2)), ("c".to_string(), item(3))],
            None,
        )
        .await
        .unwrap();

        assert_eq!(dict.len().await.unwrap(), 3);
        assert_eq!(
            dict.get(&"a".to_string()).await.unwrap().into_option(),
            Some(item(11))
        );
        assert!(dict.contains_key(&"b".to_string()).await.unwrap());

        let fetched = dict
            .get_many(&["a".to_string(), "missing".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 3);
        assert!(fetched[0].has_value());
        assert!(!fetched[1].has_value());
        assert_eq!(fetched[2].clone().into_option(), Some(item(3)));

        assert!(dict.remove(&"a".to_string()).await.unwrap());
        assert!(!dict.remove(&"a".to_string()).await.unwrap());

        let mut all = dict.get_all().await.unwrap();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            all,
            vec![("b".to_string(), item(2)), ("c".to_string(), item(3))]
        );

        let mut keys = dict.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(dict.values().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn get_or_set_runs_factory_only_on_miss() {
        let connection = memory_connection();
        let dict = RedisDictionary::<String, i64>::new(&connection, "scores");

        let first = dict
            .get_or_set(&"p1".to_string(), || 100, None)
            .await
            .unwrap();
        assert_eq!(first, 100);
        let second = dict
            .get_or_set(&"p1".to_string(), || panic!("factory must not run"), None)
            .await
            .unwrap();
        assert_eq!(second, 100);
    }
}

mod sorted_set {
    use super::*;

    #[tokio::test]
    async fn ordering_and_ranks() {
        let connection = memory_connection();
        let board = RedisSortedSet::<String>::new(&connection, "leaderboard");
        board
            .add_many(
                &[
                    ("alice".to_string(), 30.0),
                    ("bob".to_string(), 10.0),
                    ("carol".to_string(), 20.0),
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(
            board.range_by_rank(0, -1).await.unwrap(),
            vec!["bob".to_string(), "carol".to_string(), "alice".to_string()]
        );
        assert_eq!(
            board.rank(&"bob".to_string()).await.unwrap().into_option(),
            Some(0)
        );
        assert_eq!(
            board
                .rev_rank(&"bob".to_string())
                .await
                .unwrap()
                .into_option(),
            Some(2)
        );
        assert!(!board.rank(&"nobody".to_string()).await.unwrap().has_value());

        let with_scores = board.range_by_rank_with_scores(0, 1).await.unwrap();
        assert_eq!(
            with_scores,
            vec![("bob".to_string(), 10.0), ("carol".to_string(), 20.0)]
        );

        assert_eq!(
            board.range_by_score(15.0, 30.0).await.unwrap(),
            vec!["carol".to_string(), "alice".to_string()]
        );
        assert_eq!(board.count(0.0, 20.0).await.unwrap(), 2);
        assert_eq!(board.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn scores_update_and_members_leave() {
        let connection = memory_connection();
        let board = RedisSortedSet::<String>::new(&connection, "board");
        assert!(board.add(&"a".to_string(), 1.0, None).await.unwrap());
        assert!(!board.add(&"a".to_string(), 5.0, None).await.unwrap());
        assert_eq!(
            board.score(&"a".to_string()).await.unwrap().into_option(),
            Some(5.0)
        );

        assert_eq!(
            board
                .increment_score(&"a".to_string(), 2.5, None)
                .await
                .unwrap(),
            7.5
        );
        assert!(board.remove(&"a".to_string()).await.unwrap());
        assert!(!board.remove(&"a".to_string()).await.unwrap());
        assert!(board.is_empty().await.unwrap());
    }
}

mod hyperloglog {
    use super::*;

    #[tokio::test]
    async fn counts_distinct_members() {
        let connection = memory_connection();
        let visitors = RedisHyperLogLog::<String>::new(&connection, "visitors");

        assert!(visitors.add(&"u1".to_string(), None).await.unwrap());
        assert!(!visitors.add(&"u1".to_string(), None).await.unwrap());
        visitors
            .add_many(&["u2".to_string(), "u3".to_string()], None)
            .await
            .unwrap();
        assert_eq!(visitors.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn merge_unions_sources() {
        let connection = memory_connection();
        let a = RedisHyperLogLog::<String>::new(&connection, "day1");
        let b = RedisHyperLogLog::<String>::new(&connection, "day2");
        let total = RedisHyperLogLog::<String>::new(&connection, "week");

        a.add_many(&["u1".to_string(), "u2".to_string()], None)
            .await
            .unwrap();
        b.add_many(&["u2".to_string(), "u3".to_string()], None)
            .await
            .unwrap();
        total.merge_from(&[&a, &b]).await.unwrap();
        assert_eq!(total.count().await.unwrap(), 3);
    }
}

mod geo {
    use super::*;

    async fn sicily(connection: &Connection) -> RedisGeo<String> {
        let geo = RedisGeo::<String>::new(connection, "sicily");
        geo.add_many(
            &[
                GeoEntry {
                    longitude: 13.361389,
                    latitude: 38.115556,
                    member: "Palermo".to_string(),
                },
                GeoEntry {
                    longitude: 15.087269,
                    latitude: 37.502669,
                    member: "Catania".to_string(),
                },
            ],
            None,
        )
        .await
        .unwrap();
        geo
    }

    #[tokio::test]
    async fn distance_between_members() {
        let connection = memory_connection();
        let geo = sicily(&connection).await;

        let km = geo
            .distance(&"Palermo".to_string(), &"Catania".to_string(), GeoUnit::Kilometers)
            .await
            .unwrap();
        assert!(km.has_value());
        assert!((km.value() - 166.27).abs() < 1.0);

        let missing = geo
            .distance(&"Palermo".to_string(), &"Rome".to_string(), GeoUnit::Meters)
            .await
            .unwrap();
        assert!(!missing.has_value());
    }

    #[tokio::test]
    async fn position_and_radius_search() {
        let connection = memory_connection();
        let geo = sicily(&connection).await;

        let position = geo.position(&"Palermo".to_string()).await.unwrap();
        assert!(position.has_value());
        assert!((position.value().longitude - 13.361389).abs() < 1e-6);
        assert!((position.value().latitude - 38.115556).abs() < 1e-6);
        assert!(!geo.position(&"Rome".to_string()).await.unwrap().has_value());

        // Catania is ~166km from Palermo: a 200km radius around Palermo
        // finds both, nearest first.
        let nearby = geo
            .radius(13.361389, 38.115556, 200.0, GeoUnit::Kilometers)
            .await
            .unwrap();
        assert_eq!(nearby, vec!["Palermo".to_string(), "Catania".to_string()]);

        let close = geo
            .radius(13.361389, 38.115556, 50.0, GeoUnit::Kilometers)
            .await
            .unwrap();
        assert_eq!(close, vec!["Palermo".to_string()]);
    }
}

mod lock {
    use super::*;

    #[tokio::test]
    async fn only_one_holder_at_a_time() {
        let connection = memory_connection();
        let lock = RedisLock::new(&connection, "resource");

        let guard = lock
            .acquire(Duration::from_secs(30))
            .await
            .unwrap()
            .expect("first acquire succeeds");
        assert!(lock.is_held().await.unwrap());
        assert!(lock.acquire(Duration::from_secs(30)).await.unwrap().is_none());

        assert!(guard.release().await.unwrap());
        assert!(!lock.is_held().await.unwrap());
        assert!(lock
            .acquire(Duration::from_secs(30))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn release_after_loss_reports_false() {
        let connection = memory_connection();
        let lock = RedisLock::new(&connection, "resource");

        let stale = lock
            .acquire(Duration::from_millis(5))
            .await
            .unwrap()
            .expect("acquired");
        std::thread::sleep(Duration::from_millis(20));

        // TTL lapsed and another client took the lock; the stale guard must
        // not be able to release or extend it.
        let current = lock
            .acquire(Duration::from_secs(30))
            .await
            .unwrap()
            .expect("lock is free again");
        assert!(!stale.extend(Duration::from_secs(30)).await.unwrap());
        assert!(!stale.release().await.unwrap());
        assert!(lock.is_held().await.unwrap());
        assert!(current.release().await.unwrap());
    }

    #[tokio::test]
    async fn extend_refreshes_ttl_for_the_holder() {
        let connection = memory_connection();
        let lock = RedisLock::new(&connection, "resource");
        let guard = lock
            .acquire(Duration::from_millis(40))
            .await
            .unwrap()
            .expect("acquired");

        assert!(guard.extend(Duration::from_secs(30)).await.unwrap());
        std::thread::sleep(Duration::from_millis(50));
        // Without the extension the lock would have lapsed by now.
        assert!(lock.is_held().await.unwrap());
        assert!(guard.release().await.unwrap());
    }
}

mod lua {
    use super::*;
    use redis_typed::{RedisLua, Script, WireValue};

    // Same shape as the bundled clamp scripts: increment, then pin to the
    // bound server-side.
    const CLAMP_MAX: &str = r#"local v = redis.call('INCRBY', KEYS[1], ARGV[1])
local limit = tonumber(ARGV[2])
if v > limit then
    redis.call('SET', KEYS[1], ARGV[2])
    return limit
end
return v"#;

    const CLAMP_MIN: &str = r#"local v = redis.call('DECRBY', KEYS[1], ARGV[1])
local limit = tonumber(ARGV[2])
if v < limit then
    redis.call('SET', KEYS[1], ARGV[2])
    return limit
end
return v"#;

    #[tokio::test]
    async fn typed_eval_serializes_args_and_reply() {
        let transport = MemoryTransport::new();
        let connection = Connection::new(ConnectionConfig::default(), transport.factory());
        let lua = RedisLua::new(&connection, "quota");
        let script = Script::new(CLAMP_MAX);

        let first = lua.eval::<i64, i64>(&script, &[6, 10]).await.unwrap();
        assert_eq!(first.into_option(), Some(6));
        let clamped = lua.eval::<i64, i64>(&script, &[6, 10]).await.unwrap();
        assert_eq!(clamped.into_option(), Some(10));

        // The script was cached by hash, so no EVAL fallback was needed.
        assert_eq!(
            transport.commands(),
            vec!["EVALSHA".to_string(), "EVALSHA".to_string()]
        );
        let stored = RedisString::<i64>::new(&connection, "quota");
        assert_eq!(stored.get().await.unwrap().into_option(), Some(10));
    }

    #[tokio::test]
    async fn raw_eval_passes_wire_args_through() {
        let connection = memory_connection();
        let counter = RedisString::<i64>::new(&connection, "floor");
        counter.set(&5, None).await.unwrap();

        let lua = RedisLua::new(&connection, "floor");
        let script = Script::new(CLAMP_MIN);
        let reply = lua
            .eval_raw(
                &script,
                &[],
                vec![WireValue::Integer(9), WireValue::Integer(0)],
            )
            .await
            .unwrap();
        assert_eq!(reply, WireValue::Integer(0));
        assert_eq!(counter.get().await.unwrap().into_option(), Some(0));
    }
}
