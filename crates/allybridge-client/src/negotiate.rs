//! Login handshake against the portal.

use crate::config::ClientConfig;
use crate::forms::{self, ASP_FORM_ID};
use crate::orchestrate::{default_headers, is_login_marker, portal_url};
use crate::session::{SessionContext, SessionHandle};
use crate::transport::{Exchange, ExchangeBody, Transport, TransportError};
use allybridge_core::Credentials;
use allybridge_core::error::AuthError;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

const LOGIN_PAGE_PATH: &str = "Login.aspx";
const USERNAME_FIELD: &str = "txtUserName";
const PASSWORD_FIELD: &str = "txtPassword";
const SUBMIT_FIELD: &str = "btnLogin";
const SUBMIT_VALUE: &str = "Log In";

/// Text the portal renders into the login page when it rejects the
/// credentials.
const FAILURE_TEXT: &str = "Invalid User Name or Password";

static ERROR_LABEL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span#lblLoginError").unwrap());

/// Performs the form login and harvests the session artifacts from the
/// landing page. Each successful negotiation produces a [`SessionHandle`]
/// with its own cookie jar; nothing is shared with previous sessions.
pub(crate) struct SessionNegotiator {
    config: ClientConfig,
    base: Url,
}

impl SessionNegotiator {
    pub(crate) fn new(config: ClientConfig, base: Url) -> Self {
        Self { config, base }
    }

    /// Runs the login flow: fetch the login form, post the credentials,
    /// classify the outcome.
    ///
    /// The credentials POST is never retried; only the initial page fetch
    /// uses the transport's attempt budget.
    pub(crate) async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<SessionHandle, AuthError> {
        if !credentials.is_usable() {
            return Err(AuthError::invalid_credentials(
                "username and password must both be non-empty",
            ));
        }

        let login_url = portal_url(&self.base, LOGIN_PAGE_PATH)
            .map_err(|e| AuthError::unexpected_response_shape(format!("bad login URL: {e}")))?;
        let transport = Transport::new(&self.config);

        let mut fetch = Exchange::get(login_url.clone());
        fetch.headers = default_headers(None);
        fetch.attempts = self.config.max_attempts;
        let page = transport.execute(&fetch).await.map_err(map_transport)?;
        if !page.status.is_success() {
            return Err(AuthError::unexpected_response_shape(format!(
                "login page returned status {}",
                page.status
            )));
        }

        let mut fields = forms::form_fields(&page.body, ASP_FORM_ID);
        if fields.is_empty() {
            return Err(AuthError::unexpected_response_shape(
                "login form not found on login page",
            ));
        }
        fields.insert(
            USERNAME_FIELD.to_string(),
            credentials.username().to_string(),
        );
        fields.insert(
            PASSWORD_FIELD.to_string(),
            credentials.password().to_string(),
        );
        fields.insert(SUBMIT_FIELD.to_string(), SUBMIT_VALUE.to_string());

        let mut submit = Exchange::post(login_url.clone());
        submit.headers = default_headers(Some(login_url.as_str()));
        submit.body = Some(ExchangeBody::Form(fields.into_iter().collect()));
        let landing = transport.execute(&submit).await.map_err(map_transport)?;

        if login_failed(&landing.body) {
            tracing::debug!("portal rejected the credentials");
            return Err(AuthError::invalid_credentials(
                "the portal rejected the username or password",
            ));
        }
        if !landing.status.is_success() {
            return Err(AuthError::unexpected_response_shape(format!(
                "login submission returned status {}",
                landing.status
            )));
        }
        if is_login_marker(landing.final_url.as_str()) {
            return Err(AuthError::unexpected_response_shape(
                "login submission did not leave the login page",
            ));
        }
        let Some(token) = forms::verification_token(&landing.body) else {
            return Err(AuthError::unexpected_response_shape(
                "post-login page carries no verification token",
            ));
        };

        let landing_fields = forms::form_fields(&landing.body, ASP_FORM_ID);
        let non_empty = |name: &str| landing_fields.get(name).filter(|v| !v.is_empty()).cloned();
        let context = SessionContext {
            company_id: non_empty("hdnCompanyID"),
            login_user: non_empty("hdnLoginUserName"),
        };

        tracing::info!(
            company_id = context.company_id.as_deref().unwrap_or("unknown"),
            "portal session established"
        );
        Ok(SessionHandle::new(transport, token, context))
    }
}

fn login_failed(body: &str) -> bool {
    if body.contains(FAILURE_TEXT) {
        return true;
    }
    let doc = Html::parse_document(body);
    doc.select(&ERROR_LABEL_SEL)
        .next()
        .is_some_and(|label| !label.text().collect::<String>().trim().is_empty())
}

fn map_transport(e: TransportError) -> AuthError {
    match e {
        TransportError::TooManyRedirects { .. } => {
            AuthError::unexpected_response_shape(e.to_string())
        }
        other => AuthError::network_failure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN_FORM: &str = r#"
        <html><body>
        <form id="aspnetForm" action="Login.aspx" method="post">
            <input type="hidden" name="__VIEWSTATE" value="vs-login" />
            <input type="text" name="txtUserName" value="" />
            <input type="password" name="txtPassword" value="" />
            <input type="submit" name="btnLogin" value="Log In" />
        </form>
        </body></html>
    "#;

    const LANDING_PAGE: &str = r#"
        <html><body>
        <form id="aspnetForm" action="Default.aspx">
            <input type="hidden" name="__RequestVerificationToken" value="tok-session" />
            <input type="hidden" name="hdnCompanyID" value="9001" />
            <input type="hidden" name="hdnLoginUserName" value="Front Desk" />
        </form>
        </body></html>
    "#;

    fn negotiator(server: &MockServer) -> SessionNegotiator {
        let config = ClientConfig::new()
            .with_base_url(format!("{}/emr", server.uri()))
            .with_retry_backoff(std::time::Duration::from_millis(5));
        let base = config.validate().unwrap();
        SessionNegotiator::new(config, base)
    }

    async fn mount_login_form(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/emr/Login.aspx"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_FORM))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn successful_login_builds_a_session() {
        let server = MockServer::start().await;
        mount_login_form(&server).await;
        Mock::given(method("POST"))
            .and(path("/emr/Login.aspx"))
            .and(body_string_contains("txtUserName=frontdesk"))
            .and(body_string_contains("__VIEWSTATE=vs-login"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/emr/Default.aspx"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/emr/Default.aspx"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_PAGE))
            .mount(&server)
            .await;

        let credentials = Credentials::new("frontdesk", "hunter2");
        let session = negotiator(&server)
            .authenticate(&credentials)
            .await
            .unwrap();

        assert_eq!(session.verification_token(), "tok-session");
        assert_eq!(session.context().company_id.as_deref(), Some("9001"));
        assert_eq!(session.context().login_user.as_deref(), Some("Front Desk"));
    }

    #[tokio::test]
    async fn rejected_credentials_are_invalid_credentials() {
        let server = MockServer::start().await;
        mount_login_form(&server).await;
        Mock::given(method("POST"))
            .and(path("/emr/Login.aspx"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><form id="aspnetForm">
                <span id="lblLoginError">Invalid User Name or Password</span>
                </form></body></html>"#,
            ))
            .mount(&server)
            .await;

        let credentials = Credentials::new("frontdesk", "wrong");
        let err = negotiator(&server)
            .authenticate(&credentials)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "auth_invalid_credentials");
    }

    #[tokio::test]
    async fn empty_credentials_fail_before_any_request() {
        let server = MockServer::start().await;
        let credentials = Credentials::new("", "");
        let err = negotiator(&server)
            .authenticate(&credentials)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "auth_invalid_credentials");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tokenless_landing_page_is_unexpected_shape() {
        let server = MockServer::start().await;
        mount_login_form(&server).await;
        Mock::given(method("POST"))
            .and(path("/emr/Login.aspx"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><form id=\"aspnetForm\">welcome</form></body></html>",
            ))
            .mount(&server)
            .await;

        let credentials = Credentials::new("frontdesk", "hunter2");
        let err = negotiator(&server)
            .authenticate(&credentials)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "auth_unexpected_response");
        assert!(err.to_string().contains("verification token"));
    }

    #[tokio::test]
    async fn broken_login_page_is_unexpected_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/emr/Login.aspx"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let credentials = Credentials::new("frontdesk", "hunter2");
        let err = negotiator(&server)
            .authenticate(&credentials)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "auth_unexpected_response");
    }
}
