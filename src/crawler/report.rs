//! Result artifact assembly.
//!
//! Builds the HTML report page stored as the job's terminal artifact: one
//! section per URL with the fetched content or the failure reason, plus a
//! summary block.

use chrono::Utc;

/// Accumulates per-URL outcomes into the final report page.
pub struct ResultPageBuilder {
    html: String,
    total: usize,
    succeeded: usize,
    failed: usize,
}

impl ResultPageBuilder {
    pub fn new(total: usize) -> Self {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n");
        html.push_str("<html><head><title>Crawling Results</title>");
        html.push_str("<meta charset=\"UTF-8\">");
        html.push_str("<style>body{font-family:Arial,sans-serif;margin:20px;}");
        html.push_str(
            ".url-section{margin:20px 0;padding:15px;border:1px solid #ddd;border-radius:5px;}",
        );
        html.push_str(".url-header{color:#333;font-size:18px;margin-bottom:10px;}");
        html.push_str(".error{color:red;}</style></head><body>\n");
        html.push_str("<h1>Crawling Results</h1>\n");
        html.push_str(&format!("<p>Total URLs: {total}</p>\n"));
        html.push_str(&format!("<p>Started at: {}</p>\n", Utc::now().to_rfc3339()));
        html.push_str("<hr>\n");
        Self {
            html,
            total,
            succeeded: 0,
            failed: 0,
        }
    }

    /// Append a fetched page.
    pub fn push_success(&mut self, url: &str, content: &str) {
        self.succeeded += 1;
        let url = escape_html(url);
        self.html.push_str("<div class=\"url-section\">\n");
        self.html.push_str(&format!(
            "<div class=\"url-header\">&#10003; Success: <a href=\"{url}\" target=\"_blank\">{url}</a></div>\n"
        ));
        self.html.push_str(
            "<div style=\"max-height:300px;overflow:auto;border:1px solid #eee;padding:10px;\">\n",
        );
        self.html.push_str(content);
        self.html.push_str("</div>\n</div>\n");
    }

    /// Append a failed fetch with its (escaped) reason.
    pub fn push_failure(&mut self, url: &str, reason: &str) {
        self.failed += 1;
        let url = escape_html(url);
        self.html.push_str("<div class=\"url-section\">\n");
        self.html.push_str(&format!(
            "<div class=\"url-header error\">&#10007; Failed: <a href=\"{url}\" target=\"_blank\">{url}</a></div>\n"
        ));
        self.html.push_str(&format!(
            "<div class=\"error\">Error: {}</div>\n",
            escape_html(reason)
        ));
        self.html.push_str("</div>\n");
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Close the page with the summary block.
    pub fn finish(mut self) -> String {
        self.html.push_str("<hr>\n<p><strong>Summary:</strong></p>\n<ul>\n");
        self.html.push_str(&format!("<li>Total: {}</li>\n", self.total));
        self.html
            .push_str(&format!("<li>Succeeded: {}</li>\n", self.succeeded));
        self.html.push_str(&format!("<li>Failed: {}</li>\n", self.failed));
        self.html.push_str("</ul>\n");
        self.html.push_str(&format!(
            "<p>Completed at: {}</p>\n",
            Utc::now().to_rfc3339()
        ));
        self.html.push_str("</body></html>");
        self.html
    }
}

/// Minimal HTML entity escaping for untrusted text.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn test_report_counts_and_sections() {
        let mut builder = ResultPageBuilder::new(2);
        builder.push_success("https://a", "<p>content</p>");
        builder.push_failure("https://b", "connection refused");
        assert_eq!(builder.succeeded(), 1);
        assert_eq!(builder.failed(), 1);

        let html = builder.finish();
        assert!(html.contains("Success: <a href=\"https://a\""));
        assert!(html.contains("Failed: <a href=\"https://b\""));
        assert!(html.contains("Error: connection refused"));
        assert!(html.contains("<li>Total: 2</li>"));
        assert!(html.contains("<li>Succeeded: 1</li>"));
        assert!(html.contains("<li>Failed: 1</li>"));
    }

    #[test]
    fn test_failure_reason_is_escaped() {
        let mut builder = ResultPageBuilder::new(1);
        builder.push_failure("https://a", "<script>alert(1)</script>");
        let html = builder.finish();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
