//! Crawler classification for request labels.
//!
//! Classification is a pure, infallible function of the user agent: callers
//! always get a boolean back, an unknown or empty agent is a regular client.

use once_cell::sync::Lazy;
use regex::RegexSet;

/// Anything able to tell crawlers apart from regular clients.
pub trait CrawlerClassifier: Send + Sync {
    fn is_crawler(&self, user_agent: &str) -> bool;
}

impl<F> CrawlerClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_crawler(&self, user_agent: &str) -> bool {
        self(user_agent)
    }
}

/// Tokens seen in the user agents of search engines, link previewers,
/// uptime monitors and scripted HTTP clients.
const BOT_PATTERNS: &[&str] = &[
    r"bot/",
    r"bot-",
    r"\bbot\b",
    r"compatible;[^)]*bot",
    r"crawl",
    r"spider",
    r"slurp",
    r"archiver",
    r"facebookexternalhit",
    r"facebookcatalog",
    r"embedly",
    r"quora link preview",
    r"whatsapp",
    r"telegrambot",
    r"discordbot",
    r"bingpreview",
    r"google-inspectiontool",
    r"googleother",
    r"feedfetcher",
    r"mediapartners-google",
    r"apis-google",
    r"yandex",
    r"baiduspider",
    r"duckduckgo",
    r"petalbot",
    r"semrush",
    r"ahrefs",
    r"mj12",
    r"headlesschrome",
    r"phantomjs",
    r"lighthouse",
    r"pingdom",
    r"uptimerobot",
    r"statuscake",
    r"^curl/",
    r"^wget/",
    r"^python-requests/",
    r"^python-urllib/",
    r"^go-http-client/",
    r"^java/",
    r"^okhttp/",
    r"^libwww-perl/",
    r"^axios/",
    r"^node-fetch/",
    r"^reqwest/",
    r"\+?https?://",
];

static DEFAULT_SET: Lazy<RegexSet> = Lazy::new(|| {
    let patterns = BOT_PATTERNS.iter().map(|p| format!("(?i){p}"));
    RegexSet::new(patterns).expect("static crawler patterns compile")
});

/// Pattern based classifier, the default collaborator.
#[derive(Clone, Debug)]
pub struct UserAgentClassifier {
    extra: Option<RegexSet>,
}

impl Default for UserAgentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl UserAgentClassifier {
    pub fn new() -> Self {
        Self { extra: None }
    }

    /// Adds site-specific patterns on top of the built-in list. Patterns are
    /// matched case-insensitively; invalid ones are skipped with a warning.
    pub fn with_extra_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let valid: Vec<String> = patterns
            .into_iter()
            .filter_map(|raw| {
                let pattern = format!("(?i){}", raw.as_ref());
                match regex::Regex::new(&pattern) {
                    Ok(_) => Some(pattern),
                    Err(err) => {
                        tracing::warn!(pattern = raw.as_ref(), %err, "ignoring invalid crawler pattern");
                        None
                    }
                }
            })
            .collect();
        let extra = if valid.is_empty() {
            None
        } else {
            RegexSet::new(valid).ok()
        };
        Self { extra }
    }
}

impl CrawlerClassifier for UserAgentClassifier {
    fn is_crawler(&self, user_agent: &str) -> bool {
        let ua = user_agent.trim();
        if ua.is_empty() {
            return false;
        }
        DEFAULT_SET.is_match(ua)
            || self
                .extra
                .as_ref()
                .map(|set| set.is_match(ua))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOGLEBOT: &str = "Mozilla/5.0 (Linux; Android 6.0.1; Nexus 5X Build/MMB29P) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.6367.201 Mobile Safari/537.36 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
    const FIREFOX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";

    #[test]
    fn googlebot_is_recognised() {
        assert!(UserAgentClassifier::new().is_crawler(GOOGLEBOT));
    }

    #[test]
    fn browsers_are_not_crawlers() {
        let classifier = UserAgentClassifier::new();
        assert!(!classifier.is_crawler(FIREFOX));
        assert!(!classifier.is_crawler(SAFARI_IPHONE));
    }

    #[test]
    fn device_names_ending_in_bot_are_browsers() {
        let classifier = UserAgentClassifier::new();
        let cubot = "Mozilla/5.0 (Linux; Android 10; CUBOT P30) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.144 Mobile Safari/537.36";
        assert!(!classifier.is_crawler(cubot));
        assert!(classifier.is_crawler(
            "Mozilla/5.0 (compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm)"
        ));
        assert!(classifier.is_crawler("Mozilla/5.0 (compatible; SomeBot; en)"));
        assert!(classifier.is_crawler("AdsBot-Google"));
    }

    #[test]
    fn scripted_clients_are_crawlers() {
        let classifier = UserAgentClassifier::new();
        assert!(classifier.is_crawler("curl/8.5.0"));
        assert!(classifier.is_crawler("python-requests/2.31.0"));
        assert!(classifier.is_crawler("facebookexternalhit/1.1"));
    }

    #[test]
    fn empty_agent_is_not_a_crawler() {
        let classifier = UserAgentClassifier::new();
        assert!(!classifier.is_crawler(""));
        assert!(!classifier.is_crawler("   "));
    }

    #[test]
    fn extra_patterns_extend_defaults() {
        let classifier = UserAgentClassifier::with_extra_patterns(["internal-checker", "(unclosed"]);
        assert!(classifier.is_crawler("Internal-Checker/0.3"));
        assert!(classifier.is_crawler(GOOGLEBOT));
        assert!(!classifier.is_crawler(FIREFOX));
    }

    #[test]
    fn closures_classify() {
        let always = |_: &str| true;
        assert!(always.is_crawler(FIREFOX));
    }
}
