use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart;
use tracing::{debug, trace};

use crate::config::EffectiveConfig;
use crate::error::SssError;

/// The one endpoint SSS serves everything from; requests differ only in
/// their query parameters and body.
pub const BASE_URL: &str = "https://www.dagertech.net/cgi-bin/cgiwrap/gershman/sss/index.cgi";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the remote SSS endpoint
///
/// One method per remote operation. Methods return the raw response
/// body; interpreting the HTML is `page`'s job.
pub struct SssClient {
    http: reqwest::Client,
}

impl SssClient {
    pub fn new() -> Result<Self> {
        // The legacy server presents a certificate chain that does not
        // validate against standard roots.
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build HTTP client")?;

        Ok(Self { http })
    }

    /// Performs the login exchange and returns the response body
    pub async fn login(
        &self,
        config: &EffectiveConfig,
        username: &str,
        password: &str,
    ) -> Result<String, SssError> {
        let body = login_body(config, username, password);
        debug!(school = %config.school, course = %config.course, term = %config.term, "logging in");

        let response = self
            .http
            .post(BASE_URL)
            .query(&context_query(config))
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let text = response.text().await?;
        trace!(body = %text, "login response");
        Ok(text)
    }

    /// Fetches the status page for the given session
    pub async fn status_page(
        &self,
        config: &EffectiveConfig,
        session_id: &str,
    ) -> Result<String, SssError> {
        self.get_page(config, session_id, "status").await
    }

    /// Fetches the submit page, which carries the assignment list
    pub async fn submit_page(
        &self,
        config: &EffectiveConfig,
        session_id: &str,
    ) -> Result<String, SssError> {
        self.get_page(config, session_id, "submit").await
    }

    /// Uploads a file as the given assignment number
    pub async fn submit_assignment(
        &self,
        config: &EffectiveConfig,
        session_id: &str,
        assignment_number: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<String, SssError> {
        debug!(assignment_number, file_name, "submitting assignment");

        let file_part = multipart::Part::bytes(contents).file_name(file_name.to_string());

        let mut form = multipart::Form::new()
            .text("ssscmd", "submit")
            .text("app", "teaching")
            .text("goto", "sss")
            .text("school", config.school.clone())
            .text("course", config.course.clone())
            .text("term", config.term.clone())
            .text("session_id", session_id.to_string())
            .text("sss_submit_assignment_number", assignment_number.to_string());
        form = form.part("sss_submit_file", file_part);

        let response = self
            .http
            .post(BASE_URL)
            .query(&session_query(config, session_id, "submit"))
            .multipart(form)
            .send()
            .await?;

        let text = response.text().await?;
        trace!(body = %text, "submit response");
        Ok(text)
    }

    /// Submits the password-change form
    pub async fn change_password(
        &self,
        config: &EffectiveConfig,
        session_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<String, SssError> {
        let body = password_change_body(config, session_id, old_password, new_password);
        debug!("changing password");

        let response = self
            .http
            .post(BASE_URL)
            .query(&session_query(config, session_id, "chgpwd"))
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let text = response.text().await?;
        trace!(body = %text, "password change response");
        Ok(text)
    }

    async fn get_page(
        &self,
        config: &EffectiveConfig,
        session_id: &str,
        ssscmd: &str,
    ) -> Result<String, SssError> {
        debug!(ssscmd, "fetching page");

        let response = self
            .http
            .get(BASE_URL)
            .query(&session_query(config, session_id, ssscmd))
            .send()
            .await?;

        let text = response.text().await?;
        trace!(body = %text, "response");
        Ok(text)
    }
}

/// The query context every request repeats
fn context_query(config: &EffectiveConfig) -> Vec<(&'static str, String)> {
    vec![
        ("app", "teaching".to_string()),
        ("goto", "sss".to_string()),
        ("school", config.school.clone()),
        ("course", config.course.clone()),
        ("term", config.term.clone()),
    ]
}

fn session_query(
    config: &EffectiveConfig,
    session_id: &str,
    ssscmd: &str,
) -> Vec<(&'static str, String)> {
    let mut query = context_query(config);
    query.push(("session_id", session_id.to_string()));
    query.push(("ssscmd", ssscmd.to_string()));
    query
}

fn login_body(config: &EffectiveConfig, username: &str, password: &str) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());

    for (key, value) in context_query(config) {
        serializer.append_pair(key, &value);
    }

    serializer.append_pair("authstring", &format!("{}/{}", username, password));
    serializer.append_pair("ssscmd", "login");
    serializer.finish()
}

fn password_change_body(
    config: &EffectiveConfig,
    session_id: &str,
    old_password: &str,
    new_password: &str,
) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());

    serializer.append_pair("ssscmd", "dochg");

    for (key, value) in context_query(config) {
        serializer.append_pair(key, &value);
    }

    serializer.append_pair("session_id", session_id);
    serializer.append_pair("old_password", old_password);
    serializer.append_pair("new_password", new_password);
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, Overrides};

    fn default_config() -> EffectiveConfig {
        EffectiveConfig::resolve(&Overrides::default(), &ConfigFile::default())
    }

    #[test]
    fn context_query_carries_the_fixed_parameters() {
        let query = context_query(&default_config());

        assert_eq!(
            query,
            vec![
                ("app", "teaching".to_string()),
                ("goto", "sss".to_string()),
                ("school", "cal_poly_pomona".to_string()),
                ("course", "CS_2600".to_string()),
                ("term", "2020_fall".to_string()),
            ]
        );
    }

    #[test]
    fn login_body_appends_authstring_and_command() {
        let body = login_body(&default_config(), "bronco", "hunter2");

        assert_eq!(
            body,
            "app=teaching&goto=sss&school=cal_poly_pomona&course=CS_2600&term=2020_fall\
             &authstring=bronco%2Fhunter2&ssscmd=login"
        );
    }

    #[test]
    fn login_body_encodes_reserved_characters() {
        let body = login_body(&default_config(), "user", "p&ss=word");
        assert!(body.contains("authstring=user%2Fp%26ss%3Dword"));
    }

    #[test]
    fn password_change_body_leads_with_the_change_command() {
        let body = password_change_body(&default_config(), "ABC123", "old", "new");

        assert_eq!(
            body,
            "ssscmd=dochg&app=teaching&goto=sss&school=cal_poly_pomona&course=CS_2600\
             &term=2020_fall&session_id=ABC123&old_password=old&new_password=new"
        );
    }

    #[test]
    fn session_query_extends_the_context() {
        let query = session_query(&default_config(), "ABC123", "status");

        assert_eq!(query[5], ("session_id", "ABC123".to_string()));
        assert_eq!(query[6], ("ssscmd", "status".to_string()));
    }
}
