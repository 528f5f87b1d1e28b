//! # Lifecycle Scenarios
//!
//! Purchases driven end to end by contract logs:
//!
//! 1. **Verification approved**: 2 of 3 verifiers approve, the purchase is Voted
//! 2. **Verification rejected**: 2 of 3 reject, arbitration opens and decides
//! 3. **Handoff failure**: the key service refuses, the purchase fails
//! 4. **No verification**: Buy straight after creation, through to Closed
//! 5. **Interleaving**: two purchases sharing blocks end as they do alone
//! 6. **Ledger noise**: malformed logs and other nodes' transactions

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use dx_01_event_decoder::MarketEvent;
    use dx_04_transaction_lifecycle::LifecycleApi;
    use shared_bus::{AnomalyKind, NotificationFilter, NotificationKind, NotificationPayload};
    use shared_types::{BlockNumber, PublishId, TxState};

    /// Listing published and purchase 42 created on the ledger.
    async fn created_purchase(verification_required: bool) -> Harness {
        let h = Harness::start().await;
        h.emit(publish(verification_required), 2);
        h.settle(2).await;
        assert_eq!(h.runtime.engine().listings().len(), 1);

        h.runtime
            .api()
            .prepare_to_buy(BUYER, PublishId::from(PUBLISH_ID))
            .await
            .unwrap();
        assert_eq!(h.runtime.engine().pending_count(), 1);

        h.emit(created(tx(42), verification_required), 4);
        h.settle(4).await;
        assert_eq!(h.runtime.engine().pending_count(), 0);
        h
    }

    // =========================================================================
    // Verification
    // =========================================================================

    #[tokio::test]
    async fn test_two_of_three_approvals_reach_voted() {
        let h = created_purchase(true).await;

        h.emit(verifiers_chosen(tx(42)), 5);
        h.emit(vote(tx(42), V1, true), 6);
        h.emit(vote(tx(42), V2, true), 6);
        h.settle(6).await;

        assert_eq!(
            h.runtime.api().state_of(&tx(42)).await,
            Some(TxState::Voted)
        );
        assert_eq!(h.transitions(tx(42)), vec![TxState::Created, TxState::Voted]);
        assert!(!h.transitions(tx(42)).contains(&TxState::Arbitrating));
    }

    #[tokio::test]
    async fn test_two_of_three_rejections_open_arbitration() {
        let h = created_purchase(true).await;

        h.emit(verifiers_chosen(tx(42)), 5);
        h.emit(vote(tx(42), V1, false), 6);
        h.emit(vote(tx(42), V3, false), 7);
        h.settle(7).await;

        assert_eq!(
            h.runtime.api().state_of(&tx(42)).await,
            Some(TxState::Arbitrating)
        );

        h.emit(arbitration_result(tx(42), false), 9);
        h.settle(9).await;

        assert_eq!(
            h.transitions(tx(42)),
            vec![TxState::Created, TxState::Arbitrating, TxState::Closed]
        );
        assert_eq!(h.runtime.engine().active_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_votes_time_out_into_arbitration() {
        let h = created_purchase(true).await;

        h.emit(verifiers_chosen(tx(42)), 5);
        h.emit(vote(tx(42), V1, true), 6);
        // Created at block 4 with a 50 block window.
        h.settle(53).await;
        assert_eq!(
            h.runtime.api().state_of(&tx(42)).await,
            Some(TxState::Created)
        );

        h.settle(54).await;
        assert_eq!(
            h.runtime.api().state_of(&tx(42)).await,
            Some(TxState::Arbitrating)
        );
    }

    // =========================================================================
    // Key handoff
    // =========================================================================

    #[tokio::test]
    async fn test_handoff_refusal_fails_purchase() {
        let h = created_purchase(false).await;
        h.keys.set_deny(true);

        h.emit(buy(tx(42)), 5);
        h.settle(5).await;

        assert_eq!(
            h.transitions(tx(42)),
            vec![TxState::Created, TxState::Buying, TxState::Failed]
        );
        assert_eq!(h.failure_parties(), vec![vec![SELLER, BUYER]]);
        assert_eq!(h.runtime.engine().active_count(), 0);

        // A late ReadyForDownload finds nothing to advance.
        h.emit(ready_for_download(tx(42)), 6);
        h.settle(6).await;
        assert!(!h.transitions(tx(42)).contains(&TxState::ReadyForDownload));
        assert_eq!(h.anomalies(), vec![AnomalyKind::UnknownTransaction]);
    }

    #[tokio::test]
    async fn test_purchase_without_verification_closes() {
        let h = created_purchase(false).await;
        let submissions_before = h.ledger.submission_count();

        h.emit(buy(tx(42)), 5);
        h.settle(5).await;
        // The seller's handoff put the buyer ciphertext on the ledger.
        assert_eq!(h.ledger.submission_count(), submissions_before + 1);

        h.emit(ready_for_download(tx(42)), 6);
        h.emit(data_confirmed(tx(42), true), 7);
        h.emit(close(tx(42)), 8);
        h.settle(8).await;

        assert_eq!(
            h.transitions(tx(42)),
            vec![
                TxState::Created,
                TxState::Buying,
                TxState::ReadyForDownload,
                TxState::Payed,
                TxState::Closed,
            ]
        );
        assert_eq!(h.runtime.engine().active_count(), 0);
        assert!(h.anomalies().is_empty());
    }

    // =========================================================================
    // Interleaving
    // =========================================================================

    type Script = Vec<(MarketEvent, BlockNumber)>;

    /// Verified purchase of the first listing, through to Closed.
    fn verified_script() -> Script {
        vec![
            (created_for(tx(42), PUBLISH_ID, true), 4),
            (verifiers_chosen(tx(42)), 5),
            (vote(tx(42), V1, true), 6),
            (vote(tx(42), V2, true), 6),
            (buy(tx(42)), 7),
            (ready_for_download(tx(42)), 8),
            (data_confirmed(tx(42), true), 9),
            (close(tx(42)), 10),
        ]
    }

    /// Unverified purchase of the second listing, through to Closed.
    fn direct_script() -> Script {
        vec![
            (created_for(tx(43), SECOND_PUBLISH_ID, false), 4),
            (buy(tx(43)), 5),
            (ready_for_download(tx(43)), 6),
            (data_confirmed(tx(43), true), 7),
            (close(tx(43)), 8),
        ]
    }

    /// Both listings published and both purchases prepared by the same
    /// buyer, then `script` replayed onto the ledger.
    async fn run_script(script: Script) -> Harness {
        let h = Harness::start().await;
        h.emit(publish_listing(PUBLISH_ID, true), 2);
        h.emit(publish_listing(SECOND_PUBLISH_ID, false), 2);
        h.settle(2).await;
        for publish_id in [PUBLISH_ID, SECOND_PUBLISH_ID] {
            h.runtime
                .api()
                .prepare_to_buy(BUYER, PublishId::from(publish_id))
                .await
                .unwrap();
        }
        assert_eq!(h.runtime.engine().pending_count(), 2);

        for (event, block) in script {
            h.emit(event, block);
        }
        h.settle(10).await;
        h
    }

    /// `first` and `second` merged block by block, `first` leading inside
    /// each block.
    fn interleave(first: Script, second: Script) -> Script {
        let mut merged = [first, second].concat();
        merged.sort_by_key(|(_, block)| *block);
        merged
    }

    #[tokio::test]
    async fn test_interleaved_purchases_end_as_they_do_alone() {
        let verified_alone = run_script(verified_script()).await;
        let direct_alone = run_script(direct_script()).await;
        assert_eq!(
            verified_alone.transitions(tx(42)),
            vec![
                TxState::Created,
                TxState::Voted,
                TxState::Buying,
                TxState::ReadyForDownload,
                TxState::Payed,
                TxState::Closed,
            ]
        );
        assert_eq!(
            direct_alone.transitions(tx(43)),
            vec![
                TxState::Created,
                TxState::Buying,
                TxState::ReadyForDownload,
                TxState::Payed,
                TxState::Closed,
            ]
        );

        for merged in [
            interleave(verified_script(), direct_script()),
            interleave(direct_script(), verified_script()),
        ] {
            let h = run_script(merged).await;
            assert_eq!(h.transitions(tx(42)), verified_alone.transitions(tx(42)));
            assert_eq!(h.transitions(tx(43)), direct_alone.transitions(tx(43)));
            assert!(h.anomalies().is_empty());
            assert_eq!(h.runtime.engine().active_count(), 0);
            assert_eq!(h.runtime.engine().pending_count(), 0);
        }
    }

    // =========================================================================
    // Ledger noise
    // =========================================================================

    #[tokio::test]
    async fn test_malformed_log_is_reported_as_decode_failure() {
        let h = Harness::start().await;

        h.emit_with(close(tx(42)), 3, |log| log.fields.clear());
        h.settle(3).await;

        let reports = h
            .runtime
            .notifications()
            .recent(&NotificationFilter::kinds(vec![NotificationKind::Anomaly]));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].block_number, Some(3));
        match &reports[0].payload {
            NotificationPayload::Anomaly { anomaly, event, .. } => {
                assert_eq!(*anomaly, AnomalyKind::DecodeFailure);
                assert_eq!(event, "TransactionClose");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_transactions_leave_no_lanes_behind() {
        let h = created_purchase(false).await;

        for id in 1_000..1_200u64 {
            h.emit(close(tx(id)), 5);
        }
        h.settle(5).await;

        // Only the purchase this node tracks keeps a lane.
        assert_eq!(h.runtime.router().stats().active_lanes, 1);
        assert_eq!(
            h.runtime.api().state_of(&tx(42)).await,
            Some(TxState::Created)
        );
    }
}
