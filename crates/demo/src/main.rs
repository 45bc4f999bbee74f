//! Walks two requests of one session through the auth service.
//!
//! `recognition-demo [username] [client-addr]` logs `username` in on the first
//! request (or lets the guest provider answer when omitted) and resolves the
//! user from the session on the second.

use std::sync::Arc;

use recognition_auth::{
    AnonymousTokenProvider, Auth, AuthConfig, AuthEvent, SessionStore, SessionTokenStorage,
    TokenFactory, User,
};
use recognition_core::RequestContext;
use recognition_events::SyncEventDispatcher;
use recognition_observability::FileLogConfig;

fn main() -> anyhow::Result<()> {
    if std::env::var_os(recognition_observability::file::ENV_LOG_DIR).is_some() {
        recognition_observability::init_file(&FileLogConfig::from_env())?;
    } else {
        recognition_observability::init();
    }

    let mut args = std::env::args().skip(1);
    let username = args.next();
    let client_addr = args.next().unwrap_or_else(|| "127.0.0.1".to_string());

    let config = AuthConfig::from_env();
    let sessions = SessionStore::arc();
    let dispatcher = SyncEventDispatcher::<AuthEvent>::arc();
    dispatcher.listen("auth.*", |event| {
        tracing::info!(?event, "auth event");
        Ok(())
    })?;

    let session_id = "demo-session";
    let build = |request: RequestContext| {
        Auth::new(
            SessionTokenStorage::new(Arc::clone(&sessions), session_id),
            request,
        )
        .with_config(&config)
        .with_provider(AnonymousTokenProvider::new(config.clone()))
        .with_dispatcher(dispatcher.clone())
    };

    let first = RequestContext::now().with_client_addr_str(&client_addr)?;
    let mut auth = build(first.clone());
    if let Some(name) = username {
        let token = TokenFactory::new(config.clone()).native_login(User::named(name), &first);
        auth.handle(token)?;
    }
    println!("request 1: {}", auth.get_user()?.username);

    let second = RequestContext::now().with_client_addr_str(&client_addr)?;
    let mut auth = build(second);
    println!("request 2: {}", auth.get_user()?.username);

    Ok(())
}
