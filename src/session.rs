/*!
 * Session helpers: who is logged in, flash messages, and the login gate.
 */
use log::*;
use tide::{Middleware, Next, Redirect, Request};

const USER_KEY: &str = "_auth_user_id";
const MESSAGES_KEY: &str = "_messages";

pub fn login<State>(req: &mut Request<State>, user_id: i64) -> tide::Result<()> {
    let session = req.session_mut();
    session.regenerate();
    session.insert(USER_KEY, user_id)?;
    Ok(())
}

pub fn logout<State>(req: &mut Request<State>) {
    req.session_mut().destroy();
}

pub fn user_id<State>(req: &Request<State>) -> Option<i64> {
    req.session().get(USER_KEY)
}

/**
 * Queue a message to show on the next rendered page
 */
pub fn flash<State>(req: &mut Request<State>, message: impl Into<String>) -> tide::Result<()> {
    let session = req.session_mut();
    let mut messages: Vec<String> = session.get(MESSAGES_KEY).unwrap_or_default();
    messages.push(message.into());
    session.insert(MESSAGES_KEY, messages)?;
    Ok(())
}

/// Drain queued messages
pub fn take_messages<State>(req: &mut Request<State>) -> Vec<String> {
    let session = req.session_mut();
    let messages: Vec<String> = session.get(MESSAGES_KEY).unwrap_or_default();
    if !messages.is_empty() {
        session.remove(MESSAGES_KEY);
    }
    messages
}

/**
 * Sends anonymous visitors away from any path mentioning `polls`, before the
 * handler gets a chance to run.
 */
#[derive(Clone, Debug)]
pub struct LoginRequired {
    pattern: String,
    redirect_to: String,
}

impl LoginRequired {
    pub fn new(pattern: impl Into<String>, redirect_to: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            redirect_to: redirect_to.into(),
        }
    }
}

impl Default for LoginRequired {
    fn default() -> Self {
        Self::new("polls", "/learn/http/")
    }
}

#[tide::utils::async_trait]
impl<State: Clone + Send + Sync + 'static> Middleware<State> for LoginRequired {
    async fn handle(&self, mut req: Request<State>, next: Next<'_, State>) -> tide::Result {
        if user_id(&req).is_none() && req.url().path().contains(&self.pattern) {
            debug!("Anonymous request for {} redirected", req.url().path());
            flash(&mut req, "Please Login to View This Page")?;
            return Ok(Redirect::new(&self.redirect_to).into());
        }
        Ok(next.run(req).await)
    }
}
