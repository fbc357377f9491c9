use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use warden_types::{
    is_valid_service_name, HealthCheck, ServiceSpec, Timeouts, DEFAULT_HEALTH_HOST,
};

use crate::{
    env::expand,
    graph::toposort,
    model::Config,
    raw::{RawConfig, RawDefaults, RawHealthCheck, RawService},
    ConfigError,
};

pub(crate) const DEFAULT_STATE_DIR: &str = ".warden/pids";
pub(crate) const DEFAULT_LOG_DIR: &str = "logs";

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

impl RawDefaults {
    fn to_timeouts(&self) -> Result<Timeouts, ConfigError> {
        let defaults = Timeouts::default();
        let pick = |value: Option<u64>, fallback: Duration| {
            value.map_or(fallback, Duration::from_millis)
        };

        let timeouts = Timeouts {
            startup: pick(self.startup_timeout_ms, defaults.startup),
            poll_interval: pick(self.poll_interval_ms, defaults.poll_interval),
            graceful_stop: pick(self.graceful_stop_ms, defaults.graceful_stop),
            forced_stop: pick(self.forced_stop_ms, defaults.forced_stop),
            connect: pick(self.connect_timeout_ms, defaults.connect),
        };

        if timeouts.poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "defaults: poll_interval_ms must be positive".into(),
            ));
        }
        if timeouts.connect.is_zero() {
            return Err(ConfigError::Validation(
                "defaults: connect_timeout_ms must be positive".into(),
            ));
        }

        Ok(timeouts)
    }
}

impl RawHealthCheck {
    fn to_health_check(&self, name: &str) -> Result<HealthCheck, ConfigError> {
        if let Some(protocol) = &self.protocol {
            if !protocol.eq_ignore_ascii_case("tcp") {
                return Err(ConfigError::Validation(format!(
                    "service `{name}`: unsupported healthcheck protocol `{protocol}`"
                )));
            }
        }
        if self.port == 0 {
            return Err(ConfigError::Validation(format!(
                "service `{name}`: healthcheck port must be non-zero"
            )));
        }

        Ok(HealthCheck::tcp(
            self.host.as_deref().unwrap_or(DEFAULT_HEALTH_HOST),
            self.port,
        ))
    }
}

impl RawService {
    fn to_spec<F>(
        &self,
        name: &str,
        base: &Path,
        log_dir: &Path,
        lookup: &F,
    ) -> Result<ServiceSpec, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !is_valid_service_name(name) {
            return Err(ConfigError::Validation(format!(
                "service `{name}`: names may only contain ASCII letters, digits, `_`, `-` and `.`"
            )));
        }
        if self.cmd.is_empty() {
            return Err(ConfigError::Validation(format!(
                "service `{name}`: cmd is empty"
            )));
        }
        if self.cmd.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "service `{name}`: cmd contains empty element"
            )));
        }

        let command = self
            .cmd
            .iter()
            .map(|part| expand(part, lookup))
            .collect::<Result<Vec<_>, _>>()?;

        let working_dir = self
            .cwd
            .as_deref()
            .map(|cwd| expand(cwd, lookup).map(|cwd| resolve(base, &cwd)))
            .transpose()?;

        let log_path = match &self.log {
            Some(log) => resolve(base, &expand(log, lookup)?),
            None => log_dir.join(format!("{name}.log")),
        };

        let env = self
            .env
            .iter()
            .flatten()
            .map(|(key, value)| Ok((key.clone(), expand(value, lookup)?)))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        let mut depends_on: Vec<String> = Vec::new();
        for dependency in self.deps.iter().flatten() {
            if dependency == name {
                return Err(ConfigError::Validation(format!(
                    "service `{name}`: a service cannot depend on itself"
                )));
            }
            if !depends_on.contains(dependency) {
                depends_on.push(dependency.clone());
            }
        }

        let health_check = self
            .healthcheck
            .as_ref()
            .map(|check| check.to_health_check(name))
            .transpose()?;

        Ok(ServiceSpec {
            name: name.to_owned(),
            command,
            working_dir,
            log_path,
            env,
            health_check,
            depends_on,
            startup_timeout: self.startup_timeout_ms.map(Duration::from_millis),
        })
    }
}

impl RawConfig {
    /// Validates the raw document and resolves relative paths against the
    /// directory containing `path`.
    pub(crate) fn into_config<F>(self, path: &Path, lookup: &F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.version != 1 {
            return Err(ConfigError::Validation(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        let base = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let state_dir = resolve(&base, self.state_dir.as_deref().unwrap_or(DEFAULT_STATE_DIR));
        let log_dir = resolve(&base, self.log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR));
        let timeouts = self.defaults.to_timeouts()?;

        let services = self
            .services
            .iter()
            .map(|(name, raw)| Ok((name.clone(), raw.to_spec(name, &base, &log_dir, lookup)?)))
            .collect::<Result<BTreeMap<String, ServiceSpec>, ConfigError>>()?;

        let all: Vec<String> = services.keys().cloned().collect();
        toposort(&services, &all)?;

        let mut profiles = BTreeMap::new();
        for (profile, raw) in self.profiles {
            if raw.services.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "profile `{profile}`: no services listed"
                )));
            }
            if let Some(unknown) = raw.services.iter().find(|s| !services.contains_key(*s)) {
                return Err(ConfigError::Validation(format!(
                    "profile `{profile}`: unknown service `{unknown}`"
                )));
            }
            profiles.insert(profile, raw.services);
        }

        Ok(Config {
            version: self.version,
            path: path.to_path_buf(),
            state_dir,
            timeouts,
            services,
            profiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::RawProfile;

    fn no_vars(_: &str) -> Option<String> {
        None
    }

    fn service(cmd: &[&str]) -> RawService {
        RawService {
            cmd: cmd.iter().map(|c| (*c).to_owned()).collect(),
            cwd: None,
            log: None,
            env: None,
            deps: None,
            healthcheck: None,
            startup_timeout_ms: None,
        }
    }

    fn config(services: Vec<(&str, RawService)>) -> RawConfig {
        RawConfig {
            version: 1,
            state_dir: None,
            log_dir: None,
            defaults: RawDefaults::default(),
            services: services
                .into_iter()
                .map(|(name, s)| (name.to_owned(), s))
                .collect(),
            profiles: BTreeMap::new(),
        }
    }

    #[test]
    fn test_raw_to_config_success() {
        let mut math = service(&["python", "agent_tools/tool_math.py"]);
        math.cwd = Some("services".to_owned());
        math.env = Some(BTreeMap::from_iter([(
            "MATH_HTTP_PORT".to_owned(),
            "8000".to_owned(),
        )]));
        math.healthcheck = Some(RawHealthCheck {
            protocol: Some("TCP".to_owned()),
            host: None,
            port: 8000,
        });
        math.startup_timeout_ms = Some(15_000);

        let mut agent = service(&["python", "main.py"]);
        agent.deps = Some(vec!["math".to_owned(), "math".to_owned()]);
        agent.log = Some("/var/log/agent.log".to_owned());

        let raw = config(vec![("math", math), ("agent", agent)]);
        let actual = raw
            .into_config(Path::new("/srv/trader/warden.toml"), &no_vars)
            .unwrap();

        let math = &actual.services["math"];
        assert_eq!(math.command, vec!["python", "agent_tools/tool_math.py"]);
        assert_eq!(math.working_dir, Some(PathBuf::from("/srv/trader/services")));
        assert_eq!(math.log_path, PathBuf::from("/srv/trader/logs/math.log"));
        assert_eq!(math.env["MATH_HTTP_PORT"], "8000");
        assert_eq!(math.health_check, Some(HealthCheck::tcp("127.0.0.1", 8000)));
        assert_eq!(math.startup_timeout, Some(Duration::from_secs(15)));

        let agent = &actual.services["agent"];
        assert_eq!(agent.depends_on, vec!["math"]);
        assert_eq!(agent.log_path, PathBuf::from("/var/log/agent.log"));
        assert_eq!(agent.working_dir, None);

        assert_eq!(actual.state_dir, PathBuf::from("/srv/trader/.warden/pids"));
        assert_eq!(actual.timeouts, Timeouts::default());
    }

    #[test]
    fn test_empty_cmd() {
        let raw = config(vec![("test", service(&[]))]);
        assert!(raw.into_config(Path::new("test.toml"), &no_vars).is_err());

        let raw = config(vec![("test", service(&["echo", " "]))]);
        assert!(raw.into_config(Path::new("test.toml"), &no_vars).is_err());
    }

    #[test]
    fn relative_config_path_resolves_against_current_directory() {
        let raw = config(vec![("math", service(&["python"]))]);

        let actual = raw.into_config(Path::new("warden.toml"), &no_vars).unwrap();

        assert_eq!(actual.state_dir, PathBuf::from("./.warden/pids"));
        assert_eq!(actual.services["math"].log_path, PathBuf::from("./logs/math.log"));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut math = service(&["python"]);
        math.deps = Some(vec!["math".to_owned()]);

        let raw = config(vec![("math", math)]);

        assert!(raw.into_config(Path::new("warden.toml"), &no_vars).is_err());
    }

    #[test]
    fn cycle_is_detected_at_load_time() {
        let mut a = service(&["a"]);
        a.deps = Some(vec!["b".to_owned()]);
        let mut b = service(&["b"]);
        b.deps = Some(vec!["a".to_owned()]);

        let raw = config(vec![("a", a), ("b", b)]);
        let err = raw.into_config(Path::new("warden.toml"), &no_vars).unwrap_err();

        assert!(matches!(err, ConfigError::Cycle(_)));
    }

    #[test]
    fn unsupported_protocol_and_zero_port_are_rejected() {
        let mut http = service(&["python"]);
        http.healthcheck = Some(RawHealthCheck {
            protocol: Some("http".to_owned()),
            host: None,
            port: 8000,
        });
        let raw = config(vec![("math", http)]);
        assert!(raw.into_config(Path::new("warden.toml"), &no_vars).is_err());

        let mut zero = service(&["python"]);
        zero.healthcheck = Some(RawHealthCheck {
            protocol: None,
            host: Some("localhost".to_owned()),
            port: 0,
        });
        let raw = config(vec![("math", zero)]);
        assert!(raw.into_config(Path::new("warden.toml"), &no_vars).is_err());
    }

    #[test]
    fn profile_with_unknown_service_is_rejected() {
        let mut raw = config(vec![("math", service(&["python"]))]);
        raw.profiles.insert(
            "us".to_owned(),
            RawProfile {
                services: vec!["math".to_owned(), "search".to_owned()],
            },
        );

        let err = raw.into_config(Path::new("warden.toml"), &no_vars).unwrap_err();

        assert!(err.to_string().contains("search"));
    }

    #[test]
    fn invalid_service_name_is_rejected() {
        let raw = config(vec![("../math", service(&["python"]))]);

        assert!(raw.into_config(Path::new("warden.toml"), &no_vars).is_err());
    }

    #[test]
    fn variables_are_expanded() {
        let mut math = service(&["python", "tool_math.py", "--port", "${MATH_HTTP_PORT:-8000}"]);
        math.env = Some(BTreeMap::from_iter([(
            "HOME_DIR".to_owned(),
            "${HOME}".to_owned(),
        )]));
        let raw = config(vec![("math", math)]);
        let lookup = |name: &str| (name == "HOME").then(|| "/home/trader".to_owned());

        let actual = raw.into_config(Path::new("warden.toml"), &lookup).unwrap();

        assert_eq!(actual.services["math"].command[3], "8000");
        assert_eq!(actual.services["math"].env["HOME_DIR"], "/home/trader");
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut raw = config(vec![("math", service(&["python"]))]);
        raw.defaults.poll_interval_ms = Some(0);

        assert!(raw.into_config(Path::new("warden.toml"), &no_vars).is_err());
    }
}
