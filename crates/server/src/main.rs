mod config;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use api::{
    auth::{decode_token, AuthConfig, CurrentUser, SESSION_COOKIE},
    directory,
    error::{ServiceError, ServiceResult},
    schema::{build_schema, AppSchema, RestaurantSchema},
    seed::seed_demo,
};
use async_graphql::{http::GraphiQLSource, ErrorExtensions, Pos, Response};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::Html,
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use entity::user;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection, EntityTrait};
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "little-lemon", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run HTTP server
    Serve {
        #[arg(long, env = "BIND", default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Run migrations (up|down|reset)
    Migrate {
        #[arg(long, default_value = "up")]
        action: String,
    },
    /// Seed demo users, categories and menu items
    Seed,
    /// Print GraphQL SDL
    PrintSchema,
}

#[derive(Clone)]
struct AppState {
    schema: RestaurantSchema,
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .context("failed to connect to the database")?,
    );

    match cli.cmd {
        Cmd::Migrate { action } => {
            match action.as_str() {
                "up" => Migrator::up(db.as_ref(), None).await?,
                "down" => Migrator::down(db.as_ref(), None).await?,
                "reset" => Migrator::reset(db.as_ref()).await?,
                other => anyhow::bail!("unknown migrate action {other:?} (use up|down|reset)"),
            }
            info!(action = %action, "migrations applied");
            Ok(())
        }
        Cmd::Seed => {
            let seeded = seed_demo(db.as_ref())
                .await
                .context("seeding demo data failed")?;
            info!(admin = %seeded.admin, customer = %seeded.customer, "demo data seeded");
            Ok(())
        }
        Cmd::PrintSchema => {
            let AppSchema(schema) = build_schema(db.clone(), config.policy);
            println!("{}", schema.sdl());
            Ok(())
        }
        Cmd::Serve { bind } => {
            Migrator::up(db.as_ref(), None).await?;
            let AppSchema(schema) = build_schema(db.clone(), config.policy);
            let state = AppState {
                schema,
                db: db.clone(),
                auth: Arc::new(config.auth.clone()),
            };
            let app = app_router(state, &config.cors_allowed_origins);

            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address {bind:?}"))?;
            let listener = TcpListener::bind(addr).await?;
            info!(
                public_catalog = config.policy.public_catalog,
                allow_signup = config.policy.allow_signup,
                "listening on http://{}",
                addr
            );
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal())
            .await?;
            Ok(())
        }
    }
}

fn app_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/graphiql", get(graphiql))
        .route("/graphql", get(graphql_get).post(graphql_post))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

async fn graphql_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    execute_graphql(state, headers, req).await
}

async fn graphql_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    execute_graphql(state, headers, req).await
}

async fn execute_graphql(
    state: AppState,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = req.into_inner();
    match authenticate_request(&state, &headers).await {
        Ok(Some(current_user)) => request = request.data(current_user),
        Ok(None) => {}
        Err(err) => return identity_failure(&err).into(),
    }
    state.schema.execute(request).await.into()
}

/// Resolves the caller from the request token. A missing or invalid token
/// leaves the request anonymous; a failed directory lookup is an error so the
/// caller never silently loses their roles.
async fn authenticate_request(
    state: &AppState,
    headers: &HeaderMap,
) -> ServiceResult<Option<CurrentUser>> {
    let Some(token) = extract_token(headers) else {
        return Ok(None);
    };
    let claims = match decode_token(&token, &state.auth) {
        Ok(claims) => claims,
        Err(err) => {
            debug!(error = %err, "rejected session token");
            return Ok(None);
        }
    };
    load_current_user(state.db.as_ref(), claims.sub).await
}

fn identity_failure(err: &ServiceError) -> Response {
    warn!(error = %err, "could not resolve caller identity");
    Response::from_errors(vec![err.extend().into_server_error(Pos::default())])
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(rest) = text.strip_prefix("Bearer ") {
                return Some(rest.trim().to_string());
            }
        }
    }
    if let Some(cookie) = headers.get(header::COOKIE) {
        if let Ok(text) = cookie.to_str() {
            for part in text.split(';') {
                let trimmed = part.trim();
                if let Some(rest) = trimmed.strip_prefix(SESSION_COOKIE) {
                    if let Some(value) = rest.strip_prefix('=') {
                        return Some(value.trim().to_string());
                    }
                }
            }
        }
    }
    None
}

/// Inactive or unknown users are treated as anonymous. Roles are read fresh
/// on every request.
async fn load_current_user(
    db: &DatabaseConnection,
    user_id: Uuid,
) -> ServiceResult<Option<CurrentUser>> {
    let Some(user) = user::Entity::find_by_id(user_id).one(db).await? else {
        debug!(user = %user_id, "token for unknown user");
        return Ok(None);
    };
    if !user.is_active {
        debug!(user = %user_id, "token for inactive user");
        return Ok(None);
    }
    let roles = directory::roles_of(db, user_id).await?;
    Ok(Some(CurrentUser { user_id, roles }))
}

async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{auth::SessionClaims, permission::PolicyConfig};
    use axum::{body::Body, http::Request, http::StatusCode};
    use jsonwebtoken::{EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};
    use tower::ServiceExt;

    fn state_on(db: DatabaseConnection) -> AppState {
        let db = Arc::new(db);
        let AppSchema(schema) = build_schema(db.clone(), PolicyConfig::default());
        AppState {
            schema,
            db,
            auth: Arc::new(AuthConfig {
                jwt_secret: "test".into(),
            }),
        }
    }

    fn token_for(user_id: Uuid, secret: &str) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize;
        let claims = SessionClaims {
            sub: user_id,
            exp: now + 300,
            iat: now,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def ".parse().unwrap());
        headers.insert(
            header::COOKIE,
            format!("{SESSION_COOKIE}=from-cookie").parse().unwrap(),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("theme=dark; {SESSION_COOKIE}=tok123; lang=en")
                .parse()
                .unwrap(),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn missing_credentials_are_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwdw==".parse().unwrap());
        assert_eq!(extract_token(&headers), None);
    }

    #[tokio::test]
    async fn healthz_responds_ok() {
        let state = state_on(Database::connect("sqlite::memory:").await.unwrap());
        let response = app_router(state, &[])
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_users_resolve_to_anonymous() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let loaded = load_current_user(&db, Uuid::new_v4()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn directory_failures_are_errors_not_anonymous() {
        // No migrations: the user table does not exist.
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let err = load_current_user(&db, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL");
    }

    #[tokio::test]
    async fn graphql_refuses_to_run_when_identity_lookup_fails() {
        let state = state_on(Database::connect("sqlite::memory:").await.unwrap());
        let token = token_for(Uuid::new_v4(), "test");
        let request = Request::post("/graphql")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(r#"{"query":"{ __typename }"}"#))
            .unwrap();
        let response = app_router(state, &[]).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errors"][0]["extensions"]["code"], "INTERNAL");
        assert_eq!(body["errors"][0]["message"], "internal server error");
        assert!(body.get("data").map_or(true, |data| data.is_null()));
    }
}
