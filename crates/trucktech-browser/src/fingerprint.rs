use rand::Rng;
use trucktech_core::BrowserConfig;

/// User agent and viewport applied to each fresh browsing context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextProfile {
    pub user_agent: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl ContextProfile {
    /// Profile taken verbatim from configuration
    pub fn from_config(config: &BrowserConfig) -> Self {
        if config.randomize_fingerprint {
            return Self::randomized();
        }

        Self {
            user_agent: config.user_agent.clone(),
            viewport_width: config.window_width,
            viewport_height: config.window_height,
        }
    }

    /// Generate a randomized desktop profile
    pub fn randomized() -> Self {
        let mut rng = rand::thread_rng();

        let user_agents = [
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        ];

        // Desktop sizes only
        let viewports = [(1920, 1080), (1366, 768), (1536, 864), (1680, 1050)];

        let (width, height) = viewports[rng.gen_range(0..viewports.len())];
        let user_agent = user_agents[rng.gen_range(0..user_agents.len())];

        Self {
            user_agent: Some(user_agent.to_string()),
            viewport_width: width,
            viewport_height: height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_config() {
        let config = BrowserConfig {
            window_width: 1280,
            window_height: 800,
            user_agent: None,
            ..BrowserConfig::default()
        };
        let profile = ContextProfile::from_config(&config);
        assert_eq!(profile.viewport_width, 1280);
        assert_eq!(profile.viewport_height, 800);
        assert!(profile.user_agent.is_none());
    }

    #[test]
    fn test_default_profile_is_fixed() {
        let config = BrowserConfig::default();
        assert!(!config.randomize_fingerprint);

        let first = ContextProfile::from_config(&config);
        let second = ContextProfile::from_config(&config);
        assert_eq!(first, second);
        assert_eq!((first.viewport_width, first.viewport_height), (1920, 1080));
        assert_eq!(first.user_agent, config.user_agent);
    }

    #[test]
    fn test_randomize_opt_in() {
        let config = BrowserConfig {
            randomize_fingerprint: true,
            ..BrowserConfig::default()
        };
        let profile = ContextProfile::from_config(&config);
        assert!(profile.user_agent.is_some());
        assert!(profile.viewport_width >= 1366);
    }

    #[test]
    fn test_randomized_profile() {
        let profile = ContextProfile::randomized();
        assert!(profile.user_agent.as_deref().is_some_and(|ua| !ua.is_empty()));
        assert!(profile.viewport_width > 0);
        assert!(profile.viewport_height > 0);
    }

    #[test]
    fn test_randomized_variation() {
        // Probabilistic, but ten identical draws out of three agents is very unlikely
        let profiles: Vec<_> = (0..10).map(|_| ContextProfile::randomized()).collect();

        let first_ua = &profiles[0].user_agent;
        let all_same = profiles.iter().all(|p| &p.user_agent == first_ua);
        assert!(!all_same, "Expected variation in user agents");
    }
}
