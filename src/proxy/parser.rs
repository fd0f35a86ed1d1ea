//! Proxy parser module for turning proxy list text into candidates

use crate::proxy::models::ProxyCandidate;
use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::Path;

/// Proxy parser for parsing proxies from strings and files
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line
    ///
    /// Supports formats:
    /// - HOST:PORT
    /// - HOST:PORT:USER:PASS (PASS may itself contain `:`)
    ///
    /// Empty lines, `#` comments and anything else yield `None`.
    pub fn parse_line(line: &str) -> Option<ProxyCandidate> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        Self::parse_colon_format(line).map(|candidate| candidate.at_line(0, line))
    }

    /// Parse host:port or host:port:user:pass[:more]
    fn parse_colon_format(line: &str) -> Option<ProxyCandidate> {
        let parts: Vec<&str> = line.split(':').collect();

        if parts.len() != 2 && parts.len() < 4 {
            return None;
        }

        let host = parts[0].trim();
        let port = parts[1].trim();
        if host.is_empty() {
            return None;
        }
        let port: u16 = port.parse().ok()?;

        if parts.len() == 2 {
            return Some(ProxyCandidate::new(host.to_string(), port));
        }

        let username = parts[2].trim().to_string();
        let password = parts[3..].join(":").trim().to_string();
        Some(ProxyCandidate::with_auth(
            host.to_string(),
            port,
            username,
            password,
        ))
    }

    /// Parse proxies from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<CandidateList> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read proxy list {}", path.display()))?;
        Ok(CandidateList::from_text(&content))
    }

    /// Save proxies to a file, one per line
    pub fn save_to_file<P: AsRef<Path>>(
        proxies: &[ProxyCandidate],
        path: P,
        full_format: bool,
    ) -> Result<()> {
        let lines: Vec<String> = proxies
            .iter()
            .map(|p| {
                if full_format {
                    p.to_full_string()
                } else {
                    p.to_simple_string()
                }
            })
            .collect();

        save_lines(&lines, path)
    }
}

/// Write lines to a file, newline-terminated, or an empty file for no lines
pub fn save_lines<P: AsRef<Path>>(lines: &[String], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// The input lines of a batch together with the candidates parsed from them.
///
/// Line indices count only non-blank lines, which is what the remaining
/// list is reported against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateList {
    lines: Vec<String>,
    candidates: Vec<ProxyCandidate>,
}

impl CandidateList {
    pub fn from_text(content: &str) -> Self {
        Self::from_lines(content.lines())
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines: Vec<String> = lines
            .into_iter()
            .map(|line| line.as_ref().trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        let candidates = lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| {
                ProxyParser::parse_line(line).map(|candidate| candidate.at_line(index, line.clone()))
            })
            .collect();

        Self { lines, candidates }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn candidates(&self) -> &[ProxyCandidate] {
        &self.candidates
    }

    pub fn into_candidates(self) -> Vec<ProxyCandidate> {
        self.candidates
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<ProxyCandidate>) {
        (self.lines, self.candidates)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Number of non-blank lines that did not parse
    pub fn skipped(&self) -> usize {
        self.lines.len() - self.candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_format() {
        let proxy = ProxyParser::parse_line("192.168.1.1:8080").unwrap();
        assert_eq!(proxy.host, "192.168.1.1");
        assert_eq!(proxy.port, 8080);
        assert_eq!(proxy.username(), "");
        assert_eq!(proxy.password(), "");
    }

    #[test]
    fn test_parse_with_auth_colon_format() {
        let proxy = ProxyParser::parse_line("192.168.1.1:8080:user:pass").unwrap();
        assert_eq!(proxy.host, "192.168.1.1");
        assert_eq!(proxy.port, 8080);
        let auth = proxy.auth.unwrap();
        assert_eq!(auth.username, "user");
        assert_eq!(auth.password, "pass");
    }

    #[test]
    fn test_parse_password_with_colons() {
        let proxy = ProxyParser::parse_line("proxy.example.net:3128:alice:pw1:pw2").unwrap();
        assert_eq!(proxy.host, "proxy.example.net");
        assert_eq!(proxy.port, 3128);
        assert_eq!(proxy.username(), "alice");
        assert_eq!(proxy.password(), "pw1:pw2");
    }

    #[test]
    fn test_parse_trims_fields() {
        let proxy = ProxyParser::parse_line("  10.0.0.1 : 80 : bob : s3cret  ").unwrap();
        assert_eq!(proxy.host, "10.0.0.1");
        assert_eq!(proxy.port, 80);
        assert_eq!(proxy.username(), "bob");
        assert_eq!(proxy.password(), "s3cret");
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(ProxyParser::parse_line("").is_none());
        assert!(ProxyParser::parse_line("   ").is_none());
    }

    #[test]
    fn test_parse_comment_line() {
        assert!(ProxyParser::parse_line("# This is a comment").is_none());
        assert!(ProxyParser::parse_line("  #1.2.3.4:80").is_none());
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(ProxyParser::parse_line("invalid").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1:8080:user").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1:abc").is_none());
        assert!(ProxyParser::parse_line("192.168.1.1:70000").is_none());
        assert!(ProxyParser::parse_line(":8080").is_none());
    }

    #[test]
    fn test_parse_text() {
        let content = r#"
192.168.1.1:8080
192.168.1.2:8080:user:pass
# This is a comment
bad-line
192.168.1.3:8080
"#;
        let proxies = CandidateList::from_text(content).into_candidates();
        assert_eq!(proxies.len(), 3);
        assert_eq!(proxies[2].host, "192.168.1.3");
    }

    #[test]
    fn test_candidate_list_indices() {
        let list = CandidateList::from_lines(["1.2.3.4:8080", "bad-line", "5.6.7.8:3128:u:p"]);
        assert_eq!(list.lines().len(), 3);
        assert_eq!(list.len(), 2);
        assert_eq!(list.skipped(), 1);

        let indices: Vec<usize> = list.candidates().iter().map(|c| c.source_line_index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(list.candidates()[1].raw_line, "5.6.7.8:3128:u:p");
    }

    #[test]
    fn test_candidate_list_skips_blank_lines_in_indexing() {
        let list = CandidateList::from_text("\n\n1.1.1.1:80\n\n  \n2.2.2.2:81\n");
        assert_eq!(list.lines(), &["1.1.1.1:80".to_string(), "2.2.2.2:81".to_string()]);
        assert_eq!(list.candidates()[1].source_line_index, 1);
    }

    #[test]
    fn test_candidate_list_empty() {
        let list = CandidateList::from_text("# only comments\n\n");
        assert!(list.is_empty());
        assert_eq!(list.skipped(), 1);
    }

    #[test]
    fn test_save_and_parse_file() {
        let dir = std::env::temp_dir().join(format!("proxy-geotz-parser-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("proxies.txt");

        let proxies =
            CandidateList::from_text("1.1.1.1:80\n2.2.2.2:81:user:p:w\n").into_candidates();
        ProxyParser::save_to_file(&proxies, &path, true).unwrap();

        let reloaded = ProxyParser::parse_file(&path).unwrap();
        assert_eq!(reloaded.candidates(), proxies.as_slice());

        fs::remove_dir_all(&dir).unwrap();
    }
}
