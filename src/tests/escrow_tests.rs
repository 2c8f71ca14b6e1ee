//! Lock and unlock through the escrow program boundary

#[cfg(test)]
mod escrow_tests {
    use crate::errors::TokenOpError;
    use crate::tests::helpers::{Harness, SOL};
    use solana_sdk::pubkey::Pubkey;

    #[tokio::test(start_paused = true)]
    async fn test_lock_then_unlock_restores_transferability() {
        let h = Harness::new();
        let (alice, signer) = h.funded_signer(10 * SOL);
        let bob = Pubkey::new_unique();
        let mint = h.catalog.issue_resource_class(0, &signer).await.unwrap();
        h.catalog.mint_units(&mint, &alice, 1, 0, &signer).await.unwrap();

        h.catalog.lock_resource(&mint, &signer).await.unwrap();
        let locked = h.catalog.escrow().derive_addresses(&mint).unwrap();
        assert_eq!(h.ledger.token_amount(&locked.locked_holding.address), Some(1));
        assert_eq!(h.ledger.associated_amount(&mint, &alice), Some(0));

        let err = h
            .catalog
            .transfer_units(&mint, &alice, &bob, 1, 0, &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenOpError::SubmissionRejected { .. }));

        h.catalog.unlock_resource(&mint, &signer).await.unwrap();
        h.catalog
            .transfer_units(&mint, &alice, &bob, 1, 0, &signer)
            .await
            .unwrap();
        assert_eq!(h.ledger.associated_amount(&mint, &bob), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_escrow_rejections_pass_through() {
        let h = Harness::new();
        let (alice, signer) = h.funded_signer(10 * SOL);
        let mint = h.catalog.issue_resource_class(0, &signer).await.unwrap();
        h.catalog.mint_units(&mint, &alice, 1, 0, &signer).await.unwrap();

        let err = h.catalog.unlock_resource(&mint, &signer).await.unwrap_err();
        assert!(matches!(
            err,
            TokenOpError::SubmissionRejected { ref detail, .. } if detail.contains("not locked")
        ));

        h.catalog.lock_resource(&mint, &signer).await.unwrap();
        let err = h.catalog.lock_resource(&mint, &signer).await.unwrap_err();
        assert!(matches!(err, TokenOpError::SubmissionRejected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_escrow_uses_configured_program() {
        let h = Harness::new();
        assert_eq!(*h.catalog.escrow().program_id(), h.escrow_program);
    }
}
