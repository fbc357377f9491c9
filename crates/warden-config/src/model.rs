use std::{collections::BTreeMap, path::PathBuf};

use warden_types::{ServiceSpec, Timeouts, Topology};

use crate::{graph::toposort, ConfigError};

/// A validated configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub version: u32,
    /// Path the configuration was loaded from.
    pub path: PathBuf,
    /// Directory holding one pid marker per tracked service.
    pub state_dir: PathBuf,
    pub timeouts: Timeouts,
    pub services: BTreeMap<String, ServiceSpec>,
    pub profiles: BTreeMap<String, Vec<String>>,
}

impl Config {
    /// Selects the topology to act on.
    ///
    /// `services`, when non-empty, names the services to act on; otherwise the
    /// members of `profile` are used, or every declared service when no
    /// profile is given either. Dependencies of the selected services are
    /// always pulled in, and the result is in start order.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the profile or one of the services is not
    /// declared.
    pub fn topology(
        &self,
        profile: Option<&str>,
        services: &[String],
    ) -> Result<Topology, ConfigError> {
        let members = match profile {
            Some(name) => Some(
                self.profiles
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownProfile(name.to_owned()))?,
            ),
            None => None,
        };

        let roots: Vec<String> = if !services.is_empty() {
            services.to_vec()
        } else if let Some(members) = members {
            members.clone()
        } else {
            self.services.keys().cloned().collect()
        };

        let order = toposort(&self.services, &roots)?;
        tracing::debug!("Resolved start order {order:?} for profile {profile:?}");

        let specs = order
            .iter()
            .filter_map(|name| self.services.get(name).cloned())
            .collect();

        Ok(Topology::new(profile.map(ToOwned::to_owned), specs))
    }

    #[must_use]
    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::parse_toml;

    const TRADER: &str = r#"
        [services.math]
        cmd = ["python", "agent_tools/tool_math.py"]
        healthcheck = { port = 8000 }

        [services.price]
        cmd = ["python", "agent_tools/tool_get_price_local.py"]
        healthcheck = { port = 8003 }

        [services.search]
        cmd = ["python", "agent_tools/tool_jina_search.py"]
        healthcheck = { port = 8001 }

        [services.agent]
        cmd = ["python", "main.py"]
        deps = ["math", "price"]

        [profiles.offline]
        services = ["agent"]
    "#;

    fn names(topology: &Topology) -> Vec<&str> {
        topology.start_order().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn whole_configuration_without_profile() {
        let config = parse_toml(TRADER, Path::new("warden.toml")).unwrap();

        let topology = config.topology(None, &[]).unwrap();

        assert_eq!(names(&topology), vec!["math", "price", "agent", "search"]);
        assert_eq!(topology.profile, None);
    }

    #[test]
    fn profile_pulls_in_dependencies() {
        let config = parse_toml(TRADER, Path::new("warden.toml")).unwrap();

        let topology = config.topology(Some("offline"), &[]).unwrap();

        assert_eq!(names(&topology), vec!["math", "price", "agent"]);
        assert_eq!(topology.profile.as_deref(), Some("offline"));
    }

    #[test]
    fn explicit_services_narrow_the_selection() {
        let config = parse_toml(TRADER, Path::new("warden.toml")).unwrap();

        let topology = config
            .topology(None, &["search".to_owned(), "math".to_owned()])
            .unwrap();

        assert_eq!(names(&topology), vec!["math", "search"]);
    }

    #[test]
    fn unknown_profile_and_service() {
        let config = parse_toml(TRADER, Path::new("warden.toml")).unwrap();

        assert!(matches!(
            config.topology(Some("cn"), &[]),
            Err(ConfigError::UnknownProfile(name)) if name == "cn"
        ));
        assert!(matches!(
            config.topology(None, &["trade".to_owned()]),
            Err(ConfigError::UnknownService(name)) if name == "trade"
        ));
    }
}
