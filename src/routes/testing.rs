/*!
 * In-process harness for handler tests: a fully wired app over temporary
 * databases and media, driven through `Server::respond`.
 */
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tide::http::{Method, Request, Response, Url};
use tide::Server;

use crate::accounts::{self, NewUser};
use crate::db::{testing, Databases};
use crate::mail::testing::Outbox;
use crate::mail::Mailer;
use crate::models::User;
use crate::{build_app, templates, AppState};

const SECRET: &[u8] = b"test-session-secret-that-is-long-enough";

pub struct TestApp {
    app: Server<AppState>,
    pub dbs: Databases,
    pub outbox: Arc<Outbox>,
    dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let outbox = Arc::new(Outbox::default());
        Self::build(outbox.clone(), outbox, false).await
    }

    pub async fn login_required() -> Self {
        let outbox = Arc::new(Outbox::default());
        Self::build(outbox.clone(), outbox, true).await
    }

    pub async fn with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        Self::build(mailer, Arc::new(Outbox::default()), false).await
    }

    async fn build(mailer: Arc<dyn Mailer>, outbox: Arc<Outbox>, login_required: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let dbs = testing::databases(&dir).await;
        let templates =
            templates::registry(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates"))).unwrap();

        let state = AppState {
            dbs: dbs.clone(),
            templates: Arc::new(templates),
            mailer,
            media_root: Arc::new(dir.path().join("media")),
        };
        let app = build_app(state, SECRET, login_required).unwrap();
        Self { app, dbs, outbox, dir }
    }

    pub fn media_root(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    async fn send(&self, mut req: Request, cookie: Option<&str>) -> Response {
        if let Some(cookie) = cookie {
            req.insert_header("Cookie", cookie);
        }
        self.app.respond(req).await.unwrap()
    }

    fn request(method: Method, path: &str) -> Request {
        Request::new(method, Url::parse(&format!("http://localhost{}", path)).unwrap())
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response {
        self.send(Self::request(Method::Get, path), cookie).await
    }

    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)], cookie: Option<&str>) -> Response {
        let mut encoder = Url::parse("http://localhost/").unwrap();
        encoder.query_pairs_mut().extend_pairs(fields);

        let mut req = Self::request(Method::Post, path);
        req.set_body(encoder.query().unwrap_or_default().to_string());
        req.insert_header("Content-Type", "application/x-www-form-urlencoded");
        self.send(req, cookie).await
    }

    pub async fn post_multipart(&self, path: &str, body: Vec<u8>, cookie: Option<&str>) -> Response {
        let mut req = Self::request(Method::Post, path);
        req.set_body(body);
        req.insert_header("Content-Type", crate::forms::testing::content_type());
        self.send(req, cookie).await
    }

    pub async fn user(&self, username: &str, password: &str) -> User {
        accounts::create_user(
            &self.dbs,
            NewUser {
                username: username.into(),
                password: password.into(),
                first_name: String::new(),
                last_name: String::new(),
                email: format!("{}@example.com", username),
            },
        )
        .await
        .unwrap()
    }

    /// Log in through the login form and return the session cookie
    pub async fn login(&self, username: &str, password: &str) -> String {
        let res = self
            .post_form(
                "/accounts/login/",
                &[("username", username), ("password", password)],
                None,
            )
            .await;
        assert_eq!(location(&res).as_deref(), Some("/polls"), "login failed");
        session_cookie(&res).expect("login did not set a session cookie")
    }
}

/// `sessionid=...` from the response, ready to send back as a `Cookie` header
pub fn session_cookie(res: &Response) -> Option<String> {
    res.header("Set-Cookie")?
        .iter()
        .map(|v| v.as_str())
        .find(|v| v.starts_with("sessionid="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn location(res: &Response) -> Option<String> {
    res.header("Location").map(|v| v.last().as_str().to_string())
}
