use proptest::prelude::*;

use bridge_auth::secret::{digest_hex, generate_secret, verify_digest};
use bridge_auth::session::InMemoryPairingStore;
use bridge_auth::token::TokenService;

// --- Property 1: digest verification ---
//
// For all (secret, digest) produced by generate_secret, verify_digest(secret,
// digest) holds; for all s' != secret, verify_digest(s', digest) does not.

proptest! {
    #[test]
    fn digest_accepts_only_its_own_secret(other in "\\PC{0,64}") {
        let (secret, digest) = generate_secret();
        prop_assert!(verify_digest(&secret, &digest));
        if other != secret {
            prop_assert!(!verify_digest(&other, &digest));
        }
    }

    #[test]
    fn digest_is_a_pure_function_of_the_secret(secret in "\\PC{1,64}") {
        let a = digest_hex(&secret);
        let b = digest_hex(&secret);
        prop_assert_eq!(a, b);
    }
}

// --- Property 2: a pairing session is redeemable at most once ---

proptest! {
    #[test]
    fn session_completes_at_most_once(ttl in 30i64..3600, n_extra_completes in 1u32..5) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = InMemoryPairingStore::new();
            let pair = store.generate_pair("ws-1", "demo", ttl, None, None).await;

            store.complete(&pair.session_id).await.unwrap();
            for _ in 0..n_extra_completes {
                let err = store.complete(&pair.session_id).await.unwrap_err();
                prop_assert_eq!(err.code(), "ALREADY_PAIRED");
            }
            Ok(())
        })?;
    }
}

#[test]
fn session_completed_by_pin_rejects_secret_redemption_and_vice_versa() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let store = InMemoryPairingStore::new();
        let pair = store.generate_pair("ws-1", "demo", 300, None, None).await;

        let by_pin = store.find_by_pin(&pair.pin).await.unwrap();
        store.complete(&by_pin.session_id).await.unwrap();

        assert!(store.find_by_digest(&pair.digest).await.is_err());
        assert!(store.find_by_pin(&pair.pin).await.is_err());
    });
}

// --- Property 7: a refresh call with a previously-revoked token is rejected ---

proptest! {
    #[test]
    fn revoked_refresh_token_is_always_rejected(device_id in "[a-z0-9-]{1,16}", workspace_id in "[a-z0-9-]{1,16}") {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let svc = TokenService::new(None, None, 3600, 86400);
            let creds = svc.issue_tokens(&device_id, &workspace_id, "demo").await;

            svc.revoke_refresh(&creds.refresh).await.unwrap();
            let err = svc.verify_refresh(&creds.refresh).await.unwrap_err();
            prop_assert_eq!(err.code(), "INVALID_TOKEN");

            // Revoking twice is still rejection, not a panic or a silent success.
            let err2 = svc.revoke_refresh(&creds.refresh).await.unwrap_err();
            prop_assert_eq!(err2.code(), "INVALID_TOKEN");
            Ok(())
        })?;
    }
}
