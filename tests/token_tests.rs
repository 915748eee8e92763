use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use mdd_api::token::{Claims, MIN_SECRET_LEN, TokenError, TokenService};

// --- Helper Functions ---

const TEST_SECRET: &[u8] =
    b"token-tests-secret-value-that-is-long-enough-for-hs512-signing-0123456789";
const OTHER_SECRET: &[u8] =
    b"a-completely-different-secret-value-also-long-enough-for-hs512-9876543210";

fn service() -> TokenService {
    TokenService::new(TEST_SECRET).unwrap()
}

fn signature_segment(token: &str) -> (&str, &str) {
    token.rsplit_once('.').unwrap()
}

// --- Tests ---

#[test]
fn test_issued_token_verifies_and_carries_subject() {
    let tokens = service();

    for user_id in [1_i64, 42, 7_000_000_123, i64::MAX] {
        let token = tokens.issue(user_id).unwrap();
        assert!(tokens.verify(&token), "token for {user_id} should verify");
        assert_eq!(tokens.extract_subject(&token), Some(user_id));
    }
}

#[test]
fn test_token_is_compact_hs512() {
    let token = service().issue(5).unwrap();

    assert_eq!(token.split('.').count(), 3);
    let header = decode_header(&token).unwrap();
    assert_eq!(header.alg, Algorithm::HS512);
}

#[test]
fn test_payload_carries_only_decimal_subject() {
    let token = service().issue(314).unwrap();

    let mut validation = Validation::new(Algorithm::HS512);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    let data = decode::<serde_json::Value>(
        &token,
        &DecodingKey::from_secret(TEST_SECRET),
        &validation,
    )
    .unwrap();

    let claims = data.claims.as_object().unwrap();
    assert_eq!(claims.len(), 1, "no exp/iat claims are populated");
    assert_eq!(claims["sub"], serde_json::json!("314"));
}

#[test]
fn test_flipping_any_signature_character_fails_verification() {
    let tokens = service();
    let token = tokens.issue(99).unwrap();
    let (head, signature) = signature_segment(&token);

    for i in 0..signature.len() {
        let mut bytes = signature.as_bytes().to_vec();
        bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
        let tampered = format!("{head}.{}", String::from_utf8(bytes).unwrap());

        assert!(!tokens.verify(&tampered), "tampered position {i} still verified");
        assert_eq!(tokens.extract_subject(&tampered), None);
    }
}

#[test]
fn test_token_from_another_key_is_rejected() {
    let ours = service();
    let theirs = TokenService::new(OTHER_SECRET).unwrap();
    let token = theirs.issue(1).unwrap();

    assert!(!ours.verify(&token));
    assert_eq!(ours.extract_subject(&token), None);
}

#[test]
fn test_malformed_input_fails_closed() {
    let tokens = service();

    for input in ["", "abc", "a.b", "a.b.c", "...", "Bearer x.y.z", "ey.ey.ey.ey"] {
        assert!(!tokens.verify(input), "{input:?} should not verify");
        assert_eq!(tokens.extract_subject(input), None);
    }
}

#[test]
fn test_other_algorithm_with_same_secret_is_rejected() {
    let claims = Claims {
        sub: "12".to_string(),
    };
    let hs256 = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap();

    let tokens = service();
    assert!(!tokens.verify(&hs256));
    assert_eq!(tokens.extract_subject(&hs256), None);
}

#[test]
fn test_non_numeric_subject_has_no_user_id() {
    let claims = Claims {
        sub: "alice".to_string(),
    };
    let token = encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap();

    let tokens = service();
    // Signature and structure are fine, the subject just is not a user id.
    assert!(tokens.verify(&token));
    assert_eq!(tokens.extract_subject(&token), None);
}

fn signed_with_subject(sub: &str) -> String {
    encode(
        &Header::new(Algorithm::HS512),
        &Claims {
            sub: sub.to_string(),
        },
        &EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap()
}

#[test]
fn test_non_canonical_numeric_subject_is_not_a_user_id() {
    let tokens = service();

    // These all parse as 7 but are not how 7 is written; they must not alias user 7.
    for sub in ["+7", "007", " 7", "7 ", "-0"] {
        let token = signed_with_subject(sub);
        assert!(tokens.verify(&token), "{sub:?}");
        assert_eq!(tokens.extract_subject(&token), None, "{sub:?}");
    }

    for (sub, id) in [("7", 7), ("0", 0), ("-1", -1)] {
        let token = signed_with_subject(sub);
        assert_eq!(tokens.extract_subject(&token), Some(id), "{sub:?}");
    }
}

#[test]
fn test_short_secret_is_refused() {
    let result = TokenService::new(b"too-short");
    assert!(matches!(result, Err(TokenError::WeakKey(9))));

    let exactly_min = vec![b'k'; MIN_SECRET_LEN];
    assert!(TokenService::new(&exactly_min).is_ok());
}

#[test]
fn test_service_is_shareable_across_threads() {
    let tokens = service();

    std::thread::scope(|scope| {
        for user_id in 1..=8_i64 {
            let tokens = tokens.clone();
            scope.spawn(move || {
                let token = tokens.issue(user_id).unwrap();
                assert!(tokens.verify(&token));
                assert_eq!(tokens.extract_subject(&token), Some(user_id));
            });
        }
    });
}
