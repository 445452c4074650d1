use super::*;
use crate::storage::{ClientStorage, GrantStorage, MemoryStorage, TokenStorage};

const REDIRECT: &str = "https://app.example/cb";

async fn setup() -> (AuthorizationProvider, Arc<MemoryStorage>, Client) {
    let storage = Arc::new(MemoryStorage::new());
    let client = Client {
        client_id: "client-1".to_string(),
        client_secret: "s3cret".to_string(),
        redirect_uri: REDIRECT.to_string(),
        owner_user_id: "dev".to_string(),
        name: "Review App".to_string(),
        description: None,
        website: None,
        created_at: Utc::now(),
    };
    storage.save_client(&client).await.unwrap();

    let provider = AuthorizationProvider::new(storage.clone(), ProviderConfig::default());
    (provider, storage, client)
}

fn oauth_err<T: std::fmt::Debug>(result: Result<T>) -> OAuthError {
    result
        .unwrap_err()
        .oauth()
        .expect("expected a protocol error")
}

async fn issue_via_code(provider: &AuthorizationProvider, user: &str, scope: &str) -> IssuedToken {
    let code = provider
        .generate_grant("client-1", user, REDIRECT, scope)
        .await
        .unwrap();
    provider
        .exchange_token(&TokenRequest::authorization_code(
            "client-1", "s3cret", &code, REDIRECT,
        ))
        .await
        .unwrap()
}

fn bearer(token: &IssuedToken) -> String {
    format!("Bearer {}", token.access_token)
}

#[tokio::test]
async fn test_validate_authorization_request() {
    let (provider, _, client) = setup().await;

    let req = AuthorizationRequest::new("client-1", "code", REDIRECT, Some("review"));
    let validated = provider.validate_authorization_request(&req).await.unwrap();
    assert_eq!(validated.client_id, client.client_id);
    assert_eq!(validated.name, "Review App");

    // Query string is ignored when matching the registered URI
    let req = AuthorizationRequest::new("client-1", "code", "https://app.example/cb?x=1", None);
    assert!(provider.validate_authorization_request(&req).await.is_ok());

    // Blank scope behaves as absent
    let req = AuthorizationRequest::new("client-1", "code", REDIRECT, Some(""));
    assert!(provider.validate_authorization_request(&req).await.is_ok());
}

#[tokio::test]
async fn test_validate_authorization_request_failures() {
    let (provider, _, _) = setup().await;

    let cases = [
        (
            AuthorizationRequest::new("nope", "code", REDIRECT, None),
            OAuthError::InvalidClient,
        ),
        (
            AuthorizationRequest::new("client-1", "token", REDIRECT, None),
            OAuthError::UnsupportedResponseType,
        ),
        (
            AuthorizationRequest::new("client-1", "code", "https://evil.example/cb", None),
            OAuthError::InvalidRedirectUri,
        ),
        (
            AuthorizationRequest::new("client-1", "code", "https://app.example/cb/extra", None),
            OAuthError::InvalidRedirectUri,
        ),
        (
            AuthorizationRequest::new("client-1", "code", REDIRECT, Some("review admin")),
            OAuthError::InvalidScope,
        ),
        (
            AuthorizationRequest::default(),
            OAuthError::InvalidClient,
        ),
    ];

    for (req, expected) in cases {
        let err = oauth_err(provider.validate_authorization_request(&req).await);
        assert_eq!(err, expected, "request: {:?}", req);
    }
}

#[tokio::test]
async fn test_client_checked_before_response_type() {
    let (provider, _, _) = setup().await;
    let req = AuthorizationRequest::new("nope", "token", "https://evil.example", Some("bogus"));
    assert_eq!(
        oauth_err(provider.validate_authorization_request(&req).await),
        OAuthError::InvalidClient
    );

    let mut req = AuthorizationRequest::new("client-1", "code", REDIRECT, None);
    req.redirect_uri = None;
    assert_eq!(
        oauth_err(provider.validate_authorization_request(&req).await),
        OAuthError::InvalidRedirectUri
    );
}

#[tokio::test]
async fn test_generate_grant_stores_code() {
    let (provider, storage, _) = setup().await;
    let before = Utc::now();
    let code = provider
        .generate_grant("client-1", "alice", REDIRECT, "review")
        .await
        .unwrap();

    assert_eq!(code.len(), DEFAULT_TOKEN_LENGTH);
    let grant = storage.get_grant("client-1", &code).await.unwrap().unwrap();
    assert_eq!(grant.user_id, "alice");
    assert_eq!(grant.scope, "review");
    assert!(grant.expires > before);
    assert!(grant.expires <= Utc::now() + Duration::seconds(DEFAULT_GRANT_EXPIRE_SECS));
}

#[tokio::test]
async fn test_authorization_code_exchange() {
    let (provider, storage, _) = setup().await;
    let issued = issue_via_code(&provider, "alice", "review vote").await;

    assert_eq!(issued.token_type, "Bearer");
    assert_eq!(issued.expires_in, DEFAULT_TOKEN_EXPIRE_SECS);
    assert_eq!(issued.scope, "review vote");
    assert_eq!(issued.access_token.len(), DEFAULT_TOKEN_LENGTH);
    assert_ne!(issued.access_token, issued.refresh_token);

    let stored = storage
        .get_token_by_access(&issued.access_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.user_id, "alice");
    assert_eq!(stored.refresh_token, issued.refresh_token);
}

#[tokio::test]
async fn test_code_is_single_use() {
    let (provider, _, _) = setup().await;
    let code = provider
        .generate_grant("client-1", "alice", REDIRECT, "review")
        .await
        .unwrap();
    let req = TokenRequest::authorization_code("client-1", "s3cret", &code, REDIRECT);

    assert!(provider.exchange_token(&req).await.is_ok());
    assert_eq!(
        oauth_err(provider.exchange_token(&req).await),
        OAuthError::InvalidGrant
    );
}

#[tokio::test]
async fn test_client_authenticated_before_grant_type() {
    let (provider, _, _) = setup().await;

    let mut req = TokenRequest::authorization_code("client-1", "wrong", "x", REDIRECT);
    req.grant_type = Some("password".to_string());
    assert_eq!(
        oauth_err(provider.exchange_token(&req).await),
        OAuthError::InvalidClient
    );

    let mut req = TokenRequest::authorization_code("client-1", "s3cret", "x", REDIRECT);
    req.client_secret = None;
    assert_eq!(
        oauth_err(provider.exchange_token(&req).await),
        OAuthError::InvalidClient
    );

    let mut req = TokenRequest::authorization_code("client-1", "s3cret", "x", REDIRECT);
    req.grant_type = Some("password".to_string());
    assert_eq!(
        oauth_err(provider.exchange_token(&req).await),
        OAuthError::UnsupportedGrantType
    );
}

#[tokio::test]
async fn test_redirect_mismatch_does_not_consume_code() {
    let (provider, _, _) = setup().await;
    let code = provider
        .generate_grant("client-1", "alice", REDIRECT, "review")
        .await
        .unwrap();

    let wrong = TokenRequest::authorization_code("client-1", "s3cret", &code, "https://app.example/other");
    assert_eq!(
        oauth_err(provider.exchange_token(&wrong).await),
        OAuthError::InvalidRedirectUri
    );

    let right = TokenRequest::authorization_code("client-1", "s3cret", &code, REDIRECT);
    assert!(provider.exchange_token(&right).await.is_ok());
}

#[tokio::test]
async fn test_expired_code_is_invalid_grant() {
    let (provider, storage, _) = setup().await;
    let grant = Grant {
        id: "g-old".to_string(),
        client_id: "client-1".to_string(),
        code: "stale-code".to_string(),
        user_id: "alice".to_string(),
        redirect_uri: REDIRECT.to_string(),
        scope: "review".to_string(),
        expires: Utc::now() - Duration::seconds(1),
    };
    assert!(storage.insert_grant(&grant).await.unwrap());

    let req = TokenRequest::authorization_code("client-1", "s3cret", "stale-code", REDIRECT);
    assert_eq!(
        oauth_err(provider.exchange_token(&req).await),
        OAuthError::InvalidGrant
    );
}

#[tokio::test]
async fn test_code_bound_to_client() {
    let (provider, storage, _) = setup().await;
    let mut other = storage.get_client("client-1").await.unwrap().unwrap();
    other.client_id = "client-2".to_string();
    other.client_secret = "other".to_string();
    storage.save_client(&other).await.unwrap();

    let code = provider
        .generate_grant("client-1", "alice", REDIRECT, "review")
        .await
        .unwrap();
    let req = TokenRequest::authorization_code("client-2", "other", &code, REDIRECT);
    assert_eq!(
        oauth_err(provider.exchange_token(&req).await),
        OAuthError::InvalidGrant
    );
}

#[tokio::test]
async fn test_refresh_rotates_access_token_only() {
    let (provider, _, _) = setup().await;
    let first = issue_via_code(&provider, "alice", "review").await;

    let refreshed = provider
        .exchange_token(&TokenRequest::refresh_token(
            "client-1",
            "s3cret",
            &first.refresh_token,
        ))
        .await
        .unwrap();

    assert_ne!(refreshed.access_token, first.access_token);
    assert_eq!(refreshed.refresh_token, first.refresh_token);
    assert_eq!(refreshed.scope, "review");

    assert_eq!(
        oauth_err(provider.get_authorized_user(Some(&bearer(&first)), &[]).await),
        OAuthError::InvalidToken
    );
    let user = provider
        .get_authorized_user(Some(&bearer(&refreshed)), &[Scope::Review])
        .await
        .unwrap();
    assert_eq!(user.user_id, "alice");
}

#[tokio::test]
async fn test_unknown_refresh_token() {
    let (provider, _, _) = setup().await;
    let req = TokenRequest::refresh_token("client-1", "s3cret", "never-issued");
    assert_eq!(
        oauth_err(provider.exchange_token(&req).await),
        OAuthError::InvalidGrant
    );

    let mut req = TokenRequest::refresh_token("client-1", "s3cret", "x");
    req.refresh_token = None;
    assert_eq!(
        oauth_err(provider.exchange_token(&req).await),
        OAuthError::InvalidGrant
    );
}

#[tokio::test]
async fn test_scope_narrowing() {
    let (provider, _, _) = setup().await;
    let first = issue_via_code(&provider, "alice", "review vote").await;

    let narrowed = provider
        .exchange_token(
            &TokenRequest::refresh_token("client-1", "s3cret", &first.refresh_token)
                .with_scope("vote"),
        )
        .await
        .unwrap();
    assert_eq!(narrowed.scope, "vote");

    // The narrowed token is now the pair's token, so review is gone
    let widened = TokenRequest::refresh_token("client-1", "s3cret", &first.refresh_token)
        .with_scope("review");
    assert_eq!(
        oauth_err(provider.exchange_token(&widened).await),
        OAuthError::InvalidScope
    );
}

#[tokio::test]
async fn test_get_authorized_user() {
    let (provider, _, _) = setup().await;
    let issued = issue_via_code(&provider, "alice", "review vote").await;

    let user = provider
        .get_authorized_user(Some(&bearer(&issued)), &[Scope::Review, Scope::Vote])
        .await
        .unwrap();
    assert_eq!(user.user_id, "alice");
    assert_eq!(user.client_id, "client-1");
    assert!(user.has_scope(Scope::Vote));
    assert!(!user.has_scope(Scope::User));

    // Extra whitespace between the parts is tolerated
    let spaced = format!("Bearer   {}", issued.access_token);
    assert!(provider.get_authorized_user(Some(&spaced), &[]).await.is_ok());
}

#[tokio::test]
async fn test_get_authorized_user_header_errors() {
    let (provider, _, _) = setup().await;
    let issued = issue_via_code(&provider, "alice", "review").await;

    let bad_headers = [
        None,
        Some(String::new()),
        Some(issued.access_token.clone()),
        Some(format!("Basic {}", issued.access_token)),
        Some(format!("bearer {}", issued.access_token)),
        Some(format!("Bearer {} extra", issued.access_token)),
    ];
    for header in bad_headers {
        assert_eq!(
            oauth_err(provider.get_authorized_user(header.as_deref(), &[]).await),
            OAuthError::NotAuthorized,
            "header: {:?}",
            header
        );
    }
}

#[tokio::test]
async fn test_get_authorized_user_token_errors() {
    let (provider, storage, _) = setup().await;
    let issued = issue_via_code(&provider, "alice", "review").await;

    assert_eq!(
        oauth_err(
            provider
                .get_authorized_user(Some("Bearer not-a-token"), &[])
                .await
        ),
        OAuthError::InvalidToken
    );
    assert_eq!(
        oauth_err(
            provider
                .get_authorized_user(Some(&bearer(&issued)), &[Scope::Vote])
                .await
        ),
        OAuthError::InvalidToken
    );

    let mut expired = storage
        .get_token_by_access(&issued.access_token)
        .await
        .unwrap()
        .unwrap();
    expired.expires = Utc::now() - Duration::seconds(1);
    storage.replace_token(&expired).await.unwrap();
    assert_eq!(
        oauth_err(provider.get_authorized_user(Some(&bearer(&issued)), &[]).await),
        OAuthError::InvalidToken
    );
}

#[tokio::test]
async fn test_one_token_per_client_user_pair() {
    let (provider, storage, _) = setup().await;
    let first = issue_via_code(&provider, "alice", "review").await;
    let second = issue_via_code(&provider, "alice", "vote").await;

    let tokens = storage.list_tokens_by_user("alice").await.unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].access_token, second.access_token);
    assert!(
        storage
            .get_token_by_refresh("client-1", &first.refresh_token)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_revoke_token() {
    let (provider, _, _) = setup().await;
    let issued = issue_via_code(&provider, "alice", "review").await;

    assert_eq!(
        oauth_err(
            provider
                .revoke_token(Some("client-1"), Some("bad"), &issued.refresh_token)
                .await
        ),
        OAuthError::InvalidClient
    );

    provider
        .revoke_token(Some("client-1"), Some("s3cret"), &issued.refresh_token)
        .await
        .unwrap();
    // Unknown tokens are accepted silently
    provider
        .revoke_token(Some("client-1"), Some("s3cret"), &issued.refresh_token)
        .await
        .unwrap();

    assert!(provider.authorized_tokens("alice").await.unwrap().is_empty());
    let req = TokenRequest::refresh_token("client-1", "s3cret", &issued.refresh_token);
    assert_eq!(
        oauth_err(provider.exchange_token(&req).await),
        OAuthError::InvalidGrant
    );
}

#[tokio::test]
async fn test_issue_token_directly() {
    let (provider, _, _) = setup().await;
    let fresh = provider
        .issue_token("client-1", None, "bob", "user")
        .await
        .unwrap();
    let kept = provider
        .issue_token("client-1", Some(&fresh.refresh_token), "bob", "user")
        .await
        .unwrap();

    assert_eq!(kept.refresh_token, fresh.refresh_token);
    assert_ne!(kept.access_token, fresh.access_token);
    assert_eq!(provider.authorized_tokens("bob").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_issue_token_empty_refresh_generates_one() {
    let (provider, storage, _) = setup().await;
    let issued = provider
        .issue_token("client-1", Some(""), "bob", "review")
        .await
        .unwrap();

    assert_eq!(issued.refresh_token.len(), provider.config().token_length);
    let stored = storage
        .get_token_by_access(&issued.access_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.refresh_token, issued.refresh_token);

    // A blank refresh token never authenticates a refresh
    let req = TokenRequest::refresh_token("client-1", "s3cret", "");
    assert_eq!(
        oauth_err(provider.exchange_token(&req).await),
        OAuthError::InvalidGrant
    );
}

#[tokio::test]
async fn test_revoke_authorization() {
    let (provider, storage, _) = setup().await;
    storage
        .save_client(&Client {
            client_id: "client-2".to_string(),
            client_secret: "other".to_string(),
            redirect_uri: REDIRECT.to_string(),
            owner_user_id: "dev".to_string(),
            name: "Vote App".to_string(),
            description: None,
            website: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let issued = issue_via_code(&provider, "alice", "review").await;
    provider
        .issue_token("client-2", None, "alice", "vote")
        .await
        .unwrap();

    assert_eq!(
        provider
            .revoke_authorization("alice", "client-1")
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        provider
            .revoke_authorization("alice", "client-1")
            .await
            .unwrap(),
        0
    );

    let remaining = provider.authorized_tokens("alice").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].client_id, "client-2");
    assert_eq!(
        oauth_err(
            provider
                .get_authorized_user(Some(&bearer(&issued)), &[])
                .await
        ),
        OAuthError::InvalidToken
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exchanges_single_winner() {
    let (provider, _, _) = setup().await;
    let code = provider
        .generate_grant("client-1", "alice", REDIRECT, "review")
        .await
        .unwrap();

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let provider = provider.clone();
            let req = TokenRequest::authorization_code("client-1", "s3cret", &code, REDIRECT);
            tokio::spawn(async move { provider.exchange_token(&req).await })
        })
        .collect();

    let mut winners = 0;
    for result in futures::future::join_all(handles).await {
        match result.expect("task") {
            Ok(_) => winners += 1,
            Err(e) => assert_eq!(e.oauth(), Some(OAuthError::InvalidGrant)),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(provider.authorized_tokens("alice").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_register_client() {
    let (provider, _, _) = setup().await;

    let client = provider
        .register_client(ClientRegistration {
            name: "Voting".to_string(),
            redirect_uri: "https://vote.example/callback".to_string(),
            owner_user_id: "dev".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(client.client_id.len(), CLIENT_ID_LENGTH);
    assert_eq!(client.client_secret.len(), CLIENT_SECRET_LENGTH);
    assert!(
        provider
            .storage()
            .get_client(&client.client_id)
            .await
            .unwrap()
            .is_some()
    );

    for uri in ["", "not a url", "ftp://x.example/cb", "https://x.example/cb#frag"] {
        let err = provider
            .register_client(ClientRegistration {
                name: "Bad".to_string(),
                redirect_uri: uri.to_string(),
                owner_user_id: "dev".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GrantryError::Validation(_)), "uri: {}", uri);
    }
}

#[test]
fn test_issued_token_omits_empty_scope() {
    let token = IssuedToken {
        access_token: "a".to_string(),
        token_type: "Bearer".to_string(),
        expires_in: 3600,
        refresh_token: "r".to_string(),
        scope: String::new(),
    };
    let json = serde_json::to_value(&token).unwrap();
    assert!(json.get("scope").is_none());
    assert_eq!(json["token_type"], "Bearer");
}

#[test]
fn test_parse_bearer() {
    assert_eq!(parse_bearer(Some("Bearer abc")), Some("abc"));
    assert_eq!(parse_bearer(Some(" Bearer  abc ")), Some("abc"));
    assert_eq!(parse_bearer(Some("Bearer")), None);
    assert_eq!(parse_bearer(None), None);
}
