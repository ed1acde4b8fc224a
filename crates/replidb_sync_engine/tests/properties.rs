//! Property tests for the local side of replication.

use proptest::prelude::*;
use replidb_core::Database;
use replidb_sync_engine::{LocalCollection, LocalReplica};
use replidb_testkit::generators::{
    change_feed_strategy, operation_sequence_strategy, LocalOperation, PropTestConfig,
};

fn replica(db: &Database) -> LocalReplica {
    LocalReplica::open(db, "items").unwrap()
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn applying_a_feed_twice_changes_nothing(feed in change_feed_strategy()) {
        let db = Database::open_in_memory();
        let local = replica(&db);

        local.apply_change(&feed, "me").unwrap();
        let once = local.collection().find_all();
        let changes = local.apply_change(&feed, "me").unwrap();

        prop_assert_eq!(changes, 0);
        prop_assert_eq!(local.collection().find_all(), once);
    }

    #[test]
    fn own_feed_is_never_applied(feed in change_feed_strategy()) {
        let db = Database::open_in_memory();
        let local = replica(&db);

        let changes = local.apply_change(&feed.with_originator("me"), "me").unwrap();
        prop_assert_eq!(changes, 0);
        prop_assert!(local.collection().find_all().is_empty());
    }

    #[test]
    fn replicated_writes_stay_out_of_the_local_feed(
        ops in operation_sequence_strategy(1, 20),
        feed in change_feed_strategy(),
    ) {
        let db = Database::open_in_memory();
        let local = replica(&db);
        for op in ops {
            match op {
                LocalOperation::Upsert(doc) => {
                    local.collection().upsert(doc).unwrap();
                }
                LocalOperation::Remove(id) => {
                    local.collection().remove(id).unwrap();
                }
            }
        }
        local.apply_change(&feed, "me").unwrap();

        let outgoing = local.changed_since(0, local.now()).unwrap();
        prop_assert!(outgoing.modified.iter().all(|doc| !doc.is_replicated()));
        prop_assert!(outgoing.modified_ids().is_disjoint(&outgoing.removed));
    }
}
