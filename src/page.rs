use scraper::{ElementRef, Html, Selector};

use crate::error::SssError;

// Element ids fixed by the remote system.
const LOGIN_ERRMSG: &str = "#sss_login_errmsg";
const OPTION_STATUS: &str = "#sss_option_status";
const STATUS_TABLE: &str = "#sss_status_table";
const SUBMIT_ASSIGNMENT_NUMBER: &str = "#sss_submit_assignment_number";

const SESSION_EXPIRED_TEXT: &str = "Session has expired";

/// One selectable assignment in the submit form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentOption {
    pub number: String,
    pub label: String,
}

/// A fetched SSS page, scoped to one response
///
/// Everything the tool knows about the remote lives in a handful of
/// fixed element ids, so this is the only module that touches the HTML.
/// One method per extracted fact; callers never see the document.
pub struct ResponsePage {
    doc: Html,
}

impl ResponsePage {
    pub fn parse(html: &str) -> Self {
        Self {
            doc: Html::parse_document(html),
        }
    }

    /// The session id embedded in the status-option anchor's href, if
    /// the page carries one
    pub fn session_id(&self) -> Option<String> {
        let anchor = self
            .doc
            .select(&sel(OPTION_STATUS))
            .next()?
            .select(&sel("a"))
            .next()?;

        session_token_from_href(anchor.value().attr("href")?)
    }

    /// The text of the login-error element
    ///
    /// `None` means the element is absent; `Some("")` means it is
    /// present but empty. The distinction matters: only non-empty text
    /// signals a failed login.
    pub fn login_error(&self) -> Option<String> {
        self.doc
            .select(&sel(LOGIN_ERRMSG))
            .next()
            .map(|el| element_text(el))
    }

    /// The score table as ordered (label, score) pairs
    ///
    /// Row 0 holds the headers, row 1 the single data row. Column 0 is
    /// the row label and is skipped; pairs whose score cell is empty
    /// are omitted.
    pub fn score_table(&self) -> Vec<(String, String)> {
        let Some(table) = self.doc.select(&sel(STATUS_TABLE)).next() else {
            return Vec::new();
        };

        let row_sel = sel("tr");
        let cell_sel = sel("th, td");
        let mut rows = table.select(&row_sel);

        let (Some(header_row), Some(data_row)) = (rows.next(), rows.next()) else {
            return Vec::new();
        };

        let headers: Vec<String> = header_row.select(&cell_sel).map(element_text).collect();
        let scores: Vec<String> = data_row.select(&cell_sel).map(element_text).collect();

        headers
            .into_iter()
            .zip(scores)
            .skip(1)
            .filter(|(_, score)| !score.is_empty())
            .collect()
    }

    /// The option elements of the submit form's assignment-number select
    pub fn assignment_options(&self) -> Vec<AssignmentOption> {
        let option_sel = sel("option");

        let Some(container) = self.doc.select(&sel(SUBMIT_ASSIGNMENT_NUMBER)).next() else {
            return Vec::new();
        };

        container
            .select(&option_sel)
            .map(|opt| {
                let label = element_text(opt);
                let number = opt
                    .value()
                    .attr("value")
                    .map(str::to_string)
                    .unwrap_or_else(|| label.clone());

                AssignmentOption { number, label }
            })
            .collect()
    }

    /// The raw text of the assignment-number container, used when the
    /// options don't parse
    pub fn submit_container_text(&self) -> Option<String> {
        self.doc
            .select(&sel(SUBMIT_ASSIGNMENT_NUMBER))
            .next()
            .map(|el| element_text(el))
    }

    /// Decides whether a status probe confirms the cached session
    ///
    /// Valid only when the page's embedded session id matches the
    /// cached one exactly. A present-but-different id and a reported
    /// expiry both mean the user has to log in again; anything else is
    /// an unknown failure carrying the page's visible text.
    pub fn classify_probe(&self, cached_session_id: &str) -> Result<(), SssError> {
        match self.session_id() {
            Some(id) if id == cached_session_id => Ok(()),
            Some(_) => Err(SssError::SessionExpired),
            None => match self.login_error() {
                Some(msg) if msg.contains(SESSION_EXPIRED_TEXT) => Err(SssError::SessionExpired),
                _ => Err(self.unknown_failure()),
            },
        }
    }

    /// The unknown-failure error for a page that matches no known
    /// pattern, carrying the page's visible text
    pub fn unknown_failure(&self) -> SssError {
        SssError::SessionUnknownFailure(self.visible_text())
    }

    fn visible_text(&self) -> String {
        let text = element_text(self.doc.root_element());
        match text.char_indices().nth(200) {
            Some((idx, _)) => format!("{}...", &text[..idx]),
            None => text,
        }
    }
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Pulls the `session_id` value out of an anchor's href
///
/// The pages link back to the CGI endpoint with the session id as a
/// query parameter, so this parses the query-pair list rather than
/// taking everything after `session_id=`.
fn session_token_from_href(href: &str) -> Option<String> {
    let query = href.split_once('?').map(|(_, q)| q).unwrap_or(href);

    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "session_id")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.dagertech.net/cgi-bin/cgiwrap/gershman/sss/index.cgi";

    fn status_page(session_id: &str) -> String {
        format!(
            r#"<html><body>
            <div id="sss_option_status">
              <a href="{BASE}?app=teaching&goto=sss&session_id={session_id}">Status</a>
            </div>
            </body></html>"#
        )
    }

    #[test]
    fn extracts_session_id_from_confirmation_anchor() {
        let page = ResponsePage::parse(&status_page("ABC123"));
        assert_eq!(page.session_id().as_deref(), Some("ABC123"));
    }

    #[test]
    fn extracts_session_id_when_not_the_last_parameter() {
        let html = format!(
            r#"<div id="sss_option_status"><a href="{BASE}?session_id=XYZ&ssscmd=status">s</a></div>"#
        );
        let page = ResponsePage::parse(&html);
        assert_eq!(page.session_id().as_deref(), Some("XYZ"));
    }

    #[test]
    fn no_session_id_without_confirmation_anchor() {
        let page = ResponsePage::parse("<html><body><p>hello</p></body></html>");
        assert_eq!(page.session_id(), None);
    }

    #[test]
    fn no_session_id_when_href_lacks_the_parameter() {
        let html = format!(r#"<div id="sss_option_status"><a href="{BASE}?app=teaching">s</a></div>"#);
        let page = ResponsePage::parse(&html);
        assert_eq!(page.session_id(), None);
    }

    #[test]
    fn login_error_distinguishes_absent_from_empty() {
        let absent = ResponsePage::parse("<html><body></body></html>");
        assert_eq!(absent.login_error(), None);

        let empty = ResponsePage::parse(r#"<div id="sss_login_errmsg"></div>"#);
        assert_eq!(empty.login_error().as_deref(), Some(""));

        let present =
            ResponsePage::parse(r#"<div id="sss_login_errmsg">Invalid Username or Password</div>"#);
        assert_eq!(
            present.login_error().as_deref(),
            Some("Invalid Username or Password")
        );
    }

    #[test]
    fn score_table_pairs_headers_with_data_row_skipping_empty_cells() {
        let html = r#"
        <table id="sss_status_table">
          <tr><th></th><th>HW1</th><th>HW2</th><th>Final</th></tr>
          <tr><td></td><td>90</td><td></td><td>B+</td></tr>
        </table>"#;

        let page = ResponsePage::parse(html);
        assert_eq!(
            page.score_table(),
            vec![
                ("HW1".to_string(), "90".to_string()),
                ("Final".to_string(), "B+".to_string()),
            ]
        );
    }

    #[test]
    fn score_table_trims_cell_whitespace() {
        let html = r#"
        <table id="sss_status_table">
          <tr><th></th><th> HW1 </th></tr>
          <tr><td></td><td>
            95
          </td></tr>
        </table>"#;

        let page = ResponsePage::parse(html);
        assert_eq!(
            page.score_table(),
            vec![("HW1".to_string(), "95".to_string())]
        );
    }

    #[test]
    fn score_table_is_empty_without_a_data_row() {
        let html = r#"<table id="sss_status_table"><tr><th></th><th>HW1</th></tr></table>"#;
        assert!(ResponsePage::parse(html).score_table().is_empty());
    }

    #[test]
    fn score_table_is_empty_when_table_is_missing() {
        assert!(ResponsePage::parse("<html></html>").score_table().is_empty());
    }

    #[test]
    fn assignment_options_parse_value_and_label() {
        let html = r#"
        <select id="sss_submit_assignment_number">
          <option value="1">HW1 - Sockets</option>
          <option value="2">HW2 - DNS</option>
        </select>"#;

        let page = ResponsePage::parse(html);
        assert_eq!(
            page.assignment_options(),
            vec![
                AssignmentOption {
                    number: "1".to_string(),
                    label: "HW1 - Sockets".to_string()
                },
                AssignmentOption {
                    number: "2".to_string(),
                    label: "HW2 - DNS".to_string()
                },
            ]
        );
    }

    #[test]
    fn assignment_option_without_value_falls_back_to_label() {
        let html = r#"<select id="sss_submit_assignment_number"><option>3</option></select>"#;
        let page = ResponsePage::parse(html);
        assert_eq!(
            page.assignment_options(),
            vec![AssignmentOption {
                number: "3".to_string(),
                label: "3".to_string()
            }]
        );
    }

    #[test]
    fn probe_accepts_exact_session_match() {
        let page = ResponsePage::parse(&status_page("ABC123"));
        assert!(page.classify_probe("ABC123").is_ok());
    }

    #[test]
    fn probe_rejects_mismatched_session_as_expired() {
        let page = ResponsePage::parse(&status_page("OTHER"));
        assert!(matches!(
            page.classify_probe("ABC123"),
            Err(SssError::SessionExpired)
        ));
    }

    #[test]
    fn probe_recognizes_expiry_message() {
        let html =
            r#"<div id="sss_login_errmsg">Session has expired. Please login again.</div>"#;
        let page = ResponsePage::parse(html);
        assert!(matches!(
            page.classify_probe("ABC123"),
            Err(SssError::SessionExpired)
        ));
    }

    #[test]
    fn probe_surfaces_unrecognized_responses() {
        let page = ResponsePage::parse("<html><body>Server maintenance tonight</body></html>");
        match page.classify_probe("ABC123") {
            Err(SssError::SessionUnknownFailure(text)) => {
                assert!(text.contains("Server maintenance"))
            }
            other => panic!("expected unknown failure, got {other:?}"),
        }
    }
}
