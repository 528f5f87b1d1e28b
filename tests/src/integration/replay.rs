//! # Replay and Restart
//!
//! Events seen twice must change nothing the second time, whether the
//! second copy comes from a rescan after restart, a duplicate log or a
//! repeated dispatch. A snapshot older than the cursor is caught up by
//! rescanning from the snapshot block.

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use dx_01_event_decoder::{marketplace_schema, MarketEvent};
    use dx_02_event_scanner::{CursorStore, FileCursorStore, ScanCursor};
    use dx_03_event_router::RoutedEvent;
    use dx_04_transaction_lifecycle::LifecycleApi;
    use node_runtime::DataDir;
    use shared_bus::NotificationSink;
    use shared_types::{FieldMap, LedgerEvent, LogPosition, PublishId, TxState};

    /// Verified purchase 42 up to ReadyForDownload. With `duplicate_logs`
    /// every log is written to the ledger twice at the same position.
    async fn verified_purchase(h: &Harness, duplicate_logs: bool) -> Vec<(MarketEvent, LogPosition)> {
        h.emit(publish(true), 2);
        h.settle(2).await;
        h.runtime
            .api()
            .prepare_to_buy(BUYER, PublishId::from(PUBLISH_ID))
            .await
            .unwrap();

        let script = vec![
            (created(tx(42), true), 4),
            (verifiers_chosen(tx(42)), 5),
            (vote(tx(42), V1, true), 6),
            (vote(tx(42), V2, true), 6),
            (buy(tx(42)), 7),
            (ready_for_download(tx(42)), 8),
        ];
        let mut delivered = Vec::new();
        for (event, block) in script {
            let position = h.emit(event.clone(), block);
            if duplicate_logs {
                h.ledger.push_log(event.to_raw_log(
                    PROTOCOL,
                    marketplace_schema(event.name()).topic(),
                    position.block_number,
                    position.log_index,
                ));
            }
            delivered.push((event, position));
        }
        h.settle(8).await;
        delivered
    }

    #[tokio::test]
    async fn test_rescan_of_last_five_events_changes_nothing() {
        let h = Harness::start().await;
        verified_purchase(&h, false).await;
        assert_eq!(
            h.transitions(tx(42)),
            vec![
                TxState::Created,
                TxState::Voted,
                TxState::Buying,
                TxState::ReadyForDownload,
            ]
        );
        let submissions = h.ledger.submission_count();

        // Rescan from VerifiersChosen (block 5) with the snapshot at block 8.
        let h = h
            .restart_with(|dir| {
                FileCursorStore::new(dir.join("cursor.json"))
                    .save(&ScanCursor::starting_at(5))
                    .unwrap();
            })
            .await;
        h.settle(9).await;

        assert_eq!(
            h.runtime.api().state_of(&tx(42)).await,
            Some(TxState::ReadyForDownload)
        );
        assert!(h.transitions(tx(42)).is_empty());
        assert!(h.anomalies().is_empty());
        assert_eq!(h.ledger.submission_count(), submissions);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_caught_up_by_rescan() {
        let h = Harness::start().await;
        h.emit(publish(true), 2);
        h.settle(2).await;
        h.runtime
            .api()
            .prepare_to_buy(BUYER, PublishId::from(PUBLISH_ID))
            .await
            .unwrap();
        h.emit(created(tx(42), true), 4);
        h.emit(verifiers_chosen(tx(42)), 5);
        h.settle(5).await;
        let stale = h.runtime.engine().snapshot().await;

        h.emit(vote(tx(42), V1, true), 6);
        h.emit(vote(tx(42), V2, true), 6);
        h.emit(buy(tx(42)), 7);
        h.emit(ready_for_download(tx(42)), 8);
        h.settle(8).await;

        // As if the node died after scanning block 8 with only the block 5
        // snapshot on disk.
        let h = h
            .restart_with(|dir| {
                let data = DataDir::open(dir).unwrap();
                data.save_snapshot(&stale).unwrap();
            })
            .await;
        h.settle(9).await;

        assert_eq!(
            h.runtime.api().state_of(&tx(42)).await,
            Some(TxState::ReadyForDownload)
        );
        assert_eq!(
            h.transitions(tx(42)),
            vec![TxState::Voted, TxState::Buying, TxState::ReadyForDownload]
        );
        assert!(h.anomalies().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_equals_single_delivery() {
        let once = Harness::start().await;
        verified_purchase(&once, false).await;

        let twice = Harness::start().await;
        let delivered = verified_purchase(&twice, true).await;
        // Every event dispatched a second time straight to the router.
        for (event, position) in delivered {
            let ledger_event = LedgerEvent {
                contract: PROTOCOL,
                name: event.name().to_string(),
                block_number: position.block_number,
                log_index: position.log_index,
                fields: FieldMap::new(),
            };
            twice
                .runtime
                .router()
                .dispatch(RoutedEvent::new(ledger_event, event));
        }
        twice.settle(12).await;
        once.settle(12).await;

        assert_eq!(twice.transitions(tx(42)), once.transitions(tx(42)));
        assert_eq!(
            twice.runtime.notifications().notifications_sent(),
            once.runtime.notifications().notifications_sent()
        );
        assert!(twice.anomalies().is_empty());
        assert_eq!(
            twice.runtime.api().state_of(&tx(42)).await,
            Some(TxState::ReadyForDownload)
        );
        assert_eq!(
            twice.ledger.submission_count(),
            once.ledger.submission_count()
        );
    }
}
