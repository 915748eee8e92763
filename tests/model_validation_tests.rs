use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
use mdd_api::{
    error::{AppError, ErrorResponse},
    models::{
        ArticleRequest, ArticleSummaryResponse, CommentRequest, LoginRequest, RegisterRequest,
        ThemeSubscriptionResponse, UpdateUserRequest, User, UserInfoResponse,
    },
    password::{hash_password, verify_password},
    validation::Validate,
};

fn register(username: &str, email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: email.to_string(),
        password: password.to_string(),
    }
}

// --- Validation ---

#[test]
fn test_register_request_accepts_valid_payload() {
    assert!(register("alice", "alice@example.com", "long-enough").validate().is_ok());
}

#[test]
fn test_email_shapes() {
    for bad in ["plain", "@example.com", "a@b", "a@.com", "a@b.", "a b@c.com", "a@b@c.com"] {
        let errors = register("alice", bad, "long-enough").validate().unwrap_err();
        assert_eq!(errors.len(), 1, "{bad:?}");
        assert_eq!(errors[0].field, "email");
    }
    for good in ["a@b.co", "first.last@sub.example.org"] {
        assert!(register("alice", good, "long-enough").validate().is_ok(), "{good:?}");
    }
}

#[test]
fn test_length_limits() {
    let long_name = "n".repeat(51);
    let errors = register(&long_name, "a@b.co", "long-enough")
        .validate()
        .unwrap_err();
    assert_eq!(errors[0].to_string(), "username: must be at most 50 characters");

    let errors = register("alice", "a@b.co", "seven77").validate().unwrap_err();
    assert_eq!(errors[0].field, "password");

    let title = ArticleRequest {
        title: "t".repeat(256),
        description: "body".to_string(),
    };
    assert_eq!(title.validate().unwrap_err()[0].field, "title");
}

#[test]
fn test_blank_fields_are_rejected() {
    let login = LoginRequest {
        identifier: "   ".to_string(),
        password: "".to_string(),
    };
    let fields: Vec<&str> = login.validate().unwrap_err().iter().map(|e| e.field).collect();
    assert_eq!(fields, vec!["identifier", "password"]);

    let comment = CommentRequest {
        comment: "\n".to_string(),
    };
    assert!(comment.validate().is_err());

    let article = ArticleRequest {
        title: "Title".to_string(),
        description: "".to_string(),
    };
    assert_eq!(article.validate().unwrap_err()[0].field, "description");
}

#[test]
fn test_update_request_only_checks_provided_fields() {
    assert!(UpdateUserRequest::default().validate().is_ok());

    let empty_strings = UpdateUserRequest {
        username: Some(String::new()),
        email: Some(String::new()),
        password: Some(String::new()),
    };
    assert!(empty_strings.validate().is_ok());

    let bad_email = UpdateUserRequest {
        email: Some("nope".to_string()),
        ..Default::default()
    };
    assert_eq!(bad_email.validate().unwrap_err()[0].field, "email");
}

// --- Serialization ---

#[test]
fn test_user_never_serializes_password_digest() {
    let user = User {
        id: 1,
        username: "alice".to_string(),
        email: "alice@example.com".to_string(),
        password_digest: "$argon2id$secret".to_string(),
        ..Default::default()
    };

    let json = serde_json::to_value(&user).unwrap();
    assert!(json.get("password_digest").is_none());

    let info = serde_json::to_value(UserInfoResponse::from(user)).unwrap();
    assert!(info.get("createdAt").is_some());
    assert!(!info.to_string().contains("argon2"));
}

#[test]
fn test_response_payloads_use_camel_case() {
    let subscription = ThemeSubscriptionResponse {
        id: 3,
        theme_id: 4,
        title: "Rust".to_string(),
        description: None,
        is_subscribed: true,
    };
    let json = serde_json::to_value(&subscription).unwrap();
    assert_eq!(json["themeId"], 4);
    assert_eq!(json["isSubscribed"], true);

    let summary = ArticleSummaryResponse {
        id: 1,
        theme_id: 2,
        user_id: 3,
        username: "alice".to_string(),
        title: "Title".to_string(),
        description: "Body".to_string(),
        publication_date: chrono::Utc::now(),
    };
    let json = serde_json::to_value(&summary).unwrap();
    assert!(json.get("publicationDate").is_some());
    assert_eq!(json["userId"], 3);
}

// --- Error Payload ---

#[tokio::test]
async fn test_error_response_shape() {
    let response = AppError::Authorization("denied".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.message, "denied");
    assert_eq!(error.details, vec!["denied".to_string()]);
    assert_eq!(error.status, 403);
}

#[test]
fn test_error_status_mapping() {
    let cases = [
        (AppError::Authentication(String::new()), 401),
        (AppError::Authorization(String::new()), 403),
        (AppError::NotFound(String::new()), 404),
        (AppError::validation("Bad request", vec![]), 400),
        (AppError::Conflict(String::new()), 409),
        (AppError::SubscriptionConflict(String::new()), 400),
        (AppError::Internal(String::new()), 500),
    ];
    for (error, status) in cases {
        assert_eq!(error.status().as_u16(), status, "{error:?}");
    }
}

// --- Passwords ---

#[test]
fn test_password_digest_round_trip() {
    let digest = hash_password("correct-horse-battery").unwrap();

    assert!(verify_password("correct-horse-battery", &digest));
    assert!(!verify_password("incorrect-horse", &digest));
    assert!(!verify_password("correct-horse-battery", "not-a-phc-string"));
    // Fresh salt per hash.
    assert_ne!(digest, hash_password("correct-horse-battery").unwrap());
}
