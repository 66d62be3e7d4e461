//! Crawler detection.

use edge_streaming::BotClassifier;
use regex_lite::Regex;

use crate::error::ServerError;

/// Default crawler pattern, matched case-insensitively against the user agent.
pub const DEFAULT_BOT_PATTERN: &str = concat!(
    r"(?i)bot\b|bot/|crawl|spider|slurp|archiver|scanner|",
    r"facebookexternalhit|embedly|bingpreview|lighthouse|headlesschrome|",
    r"pinterest|vkshare|w3c_validator|whatsapp|quora link preview|",
    r"^curl|^wget|python-requests|go-http-client|^java/"
);

/// Classifies user agents with a regular expression.
#[derive(Debug, Clone)]
pub struct UserAgentClassifier {
    pattern: Regex,
}

impl UserAgentClassifier {
    /// Classifier using [`DEFAULT_BOT_PATTERN`].
    pub fn new() -> Result<Self, ServerError> {
        Self::with_pattern(DEFAULT_BOT_PATTERN)
    }

    /// Classifier using a custom pattern.
    pub fn with_pattern(pattern: &str) -> Result<Self, ServerError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl BotClassifier for UserAgentClassifier {
    fn is_bot(&self, user_agent: &str) -> bool {
        !user_agent.is_empty() && self.pattern.is_match(user_agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_crawlers() {
        let classifier = UserAgentClassifier::new().unwrap();

        for ua in [
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
            "Mozilla/5.0 (compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm)",
            "Mozilla/5.0 (compatible; Yahoo! Slurp; http://help.yahoo.com/help/us/ysearch/slurp)",
            "facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)",
            "curl/8.4.0",
            "python-requests/2.31.0",
        ] {
            assert!(classifier.is_bot(ua), "{ua} should be a crawler");
        }
    }

    #[test]
    fn test_browsers_are_not_crawlers() {
        let classifier = UserAgentClassifier::new().unwrap();

        for ua in [
            "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
            "",
        ] {
            assert!(!classifier.is_bot(ua), "{ua} should not be a crawler");
        }
    }

    #[test]
    fn test_custom_pattern() {
        let classifier = UserAgentClassifier::with_pattern("(?i)^internal-prerender").unwrap();
        assert!(classifier.is_bot("Internal-Prerender/1.0"));
        assert!(!classifier.is_bot("Googlebot/2.1"));

        assert!(matches!(
            UserAgentClassifier::with_pattern("(unclosed"),
            Err(ServerError::BotPattern(_))
        ));
    }
}
