use chrono::{Duration, Utc};
use uuid::Uuid;

use tessera_auth::domain::types::PasscodeRecord;
use tessera_auth::usecase::passcode::PasscodeCode;

use crate::helpers::passcode_service;

const EMAIL: &str = "user@example.com";

/// A guess that can never equal a generated numeric code.
const WRONG: &str = "xxxxxx";

#[tokio::test]
async fn should_send_passcode_and_store_record() {
    let (service, store, mailer) = passcode_service();

    let outcome = service.request(EMAIL).await.unwrap();

    assert_eq!(outcome.code, PasscodeCode::PasscodeSent);
    assert_eq!(outcome.timing.attempts_remaining, 5);
    assert_eq!(mailer.count(), 1);
    let record = store.record(EMAIL).unwrap();
    assert_eq!(record.otp_id, outcome.timing.otp_id);
    assert_eq!(record.attempts, 0);
    assert_eq!(record.code.len(), 6);
    assert_eq!(mailer.last_code(), record.code);
    assert!(outcome.timing.resend_available_at > Utc::now() + Duration::seconds(55));
    assert!(outcome.timing.expires_at > outcome.timing.resend_available_at);
}

#[tokio::test]
async fn should_rate_limit_within_cooldown_and_keep_existing_passcode() {
    let (service, store, mailer) = passcode_service();

    let first = service.request(EMAIL).await.unwrap();
    let code = store.record(EMAIL).unwrap().code;
    let second = service.request(EMAIL).await.unwrap();

    assert_eq!(second.code, PasscodeCode::RateLimited);
    assert_eq!(second.timing.otp_id, first.timing.otp_id);
    assert_eq!(
        second.timing.resend_available_at,
        first.timing.resend_available_at
    );
    assert_eq!(mailer.count(), 1);
    assert_eq!(store.record(EMAIL).unwrap().code, code);
}

#[tokio::test]
async fn concurrent_first_requests_send_one_passcode() {
    let (service, store, mailer) = passcode_service();
    let winner = PasscodeRecord {
        otp_id: Uuid::new_v4(),
        code: "424242".to_owned(),
        attempts: 0,
        created_at: Utc::now(),
    };
    store.race_with(EMAIL, winner.clone());

    let outcome = service.request(EMAIL).await.unwrap();

    assert_eq!(outcome.code, PasscodeCode::RateLimited);
    assert_eq!(outcome.timing.otp_id, winner.otp_id);
    assert_eq!(mailer.count(), 0);
    assert_eq!(store.record(EMAIL).unwrap().code, "424242");
}

#[tokio::test]
async fn should_issue_new_passcode_after_cooldown() {
    let (service, store, mailer) = passcode_service();

    let first = service.request(EMAIL).await.unwrap();
    store.backdate(EMAIL, Duration::seconds(61));
    let second = service.request(EMAIL).await.unwrap();

    assert_eq!(second.code, PasscodeCode::PasscodeSent);
    assert_ne!(second.timing.otp_id, first.timing.otp_id);
    assert_eq!(mailer.count(), 2);
    assert_eq!(store.record(EMAIL).unwrap().otp_id, second.timing.otp_id);
}

#[tokio::test]
async fn should_verify_correct_passcode_once() {
    let (service, store, mailer) = passcode_service();
    service.request(EMAIL).await.unwrap();
    let code = mailer.last_code();

    let outcome = service.verify(EMAIL, &code).await.unwrap();
    assert_eq!(outcome.code, PasscodeCode::Verified);
    assert!(store.record(EMAIL).is_none());

    let replay = service.verify(EMAIL, &code).await.unwrap();
    assert_eq!(replay.code, PasscodeCode::Expired);
}

#[tokio::test]
async fn should_normalize_email_on_request_and_verify() {
    let (service, store, mailer) = passcode_service();
    service.request("  User@Example.COM ").await.unwrap();
    assert!(store.record(EMAIL).is_some());

    let outcome = service.verify(EMAIL, &mailer.last_code()).await.unwrap();
    assert_eq!(outcome.code, PasscodeCode::Verified);
}

#[tokio::test]
async fn should_count_down_then_exhaust_attempts() {
    let (service, store, mailer) = passcode_service();
    service.request(EMAIL).await.unwrap();
    let code = mailer.last_code();

    for remaining in [4, 3, 2, 1] {
        let outcome = service.verify(EMAIL, WRONG).await.unwrap();
        assert_eq!(outcome.code, PasscodeCode::Invalid);
        assert_eq!(outcome.attempts_remaining, Some(remaining));
    }
    assert_eq!(store.record(EMAIL).unwrap().attempts, 4);

    let fifth = service.verify(EMAIL, WRONG).await.unwrap();
    assert_eq!(fifth.code, PasscodeCode::AttemptsExceeded);
    assert_eq!(fifth.attempts_remaining, Some(0));
    assert!(store.record(EMAIL).is_none());

    // The record is gone, so even the right code no longer works.
    let after = service.verify(EMAIL, &code).await.unwrap();
    assert_eq!(after.code, PasscodeCode::Expired);
}

#[tokio::test]
async fn failed_attempt_does_not_extend_ttl() {
    let (service, store, _mailer) = passcode_service();
    service.request(EMAIL).await.unwrap();
    let before = store.records.lock().unwrap().get(EMAIL).unwrap().1;

    service.verify(EMAIL, WRONG).await.unwrap();

    let after = store.records.lock().unwrap().get(EMAIL).unwrap().1;
    assert!(after <= before + Duration::milliseconds(50));
}

#[tokio::test]
async fn should_report_expired_for_missing_or_lapsed_passcode() {
    let (service, store, mailer) = passcode_service();

    let missing = service.verify(EMAIL, "123456").await.unwrap();
    assert_eq!(missing.code, PasscodeCode::Expired);
    assert_eq!(missing.attempts_remaining, None);

    service.request(EMAIL).await.unwrap();
    store.expire(EMAIL);
    let lapsed = service.verify(EMAIL, &mailer.last_code()).await.unwrap();
    assert_eq!(lapsed.code, PasscodeCode::Expired);
}

#[tokio::test]
async fn should_accept_surrounding_whitespace_in_submitted_code() {
    let (service, _store, mailer) = passcode_service();
    service.request(EMAIL).await.unwrap();

    let padded = format!(" {} ", mailer.last_code());
    let outcome = service.verify(EMAIL, &padded).await.unwrap();
    assert_eq!(outcome.code, PasscodeCode::Verified);
}
