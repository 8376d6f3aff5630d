use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use discovery::stackit::SdConfig;
use regex::{Captures, Regex};
use serde::Deserialize;

static ENVIRONMENT_VARIABLE_INTERPOLATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$|
        \$([[:word:].]+)|
        \$\{([[:word:].]+)(?::-([^}]*))?\}",
    )
    .expect("valid interpolation regex")
});

/// ```yaml
/// stackit:
///   role: mongodb_flex
///   project: ${STACKIT_PROJECT}
///   auth:
///     strategy: bearer
///     token: ${STACKIT_TOKEN}
///
/// output: /etc/prometheus/targets/stackit.json
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub stackit: SdConfig,

    /// The file targets are written to in the `file_sd_configs` format,
    /// stdout is used if not set.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// Reads, interpolates and parses the config file at `path`.
pub fn load(path: &Path) -> Result<Config, Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| vec![format!("Could not read config file {path:?}, {err}")])?;

    load_from_str(&content, &environment())
}

pub fn load_from_str(input: &str, vars: &HashMap<String, String>) -> Result<Config, Vec<String>> {
    let interpolated = interpolate(input, vars)?;

    let config =
        serde_yaml::from_str::<Config>(&interpolated).map_err(|err| vec![err.to_string()])?;

    let mut errs = Vec::new();
    if config.stackit.refresh_interval.is_zero() {
        errs.push("stackit.refresh_interval must be greater than 0".to_string());
    }
    if config.stackit.timeout.is_zero() {
        errs.push("stackit.timeout must be greater than 0".to_string());
    }
    if !errs.is_empty() {
        return Err(errs);
    }

    if config.stackit.timeout > config.stackit.refresh_interval {
        warn!(
            message = "timeout is longer than refresh_interval",
            timeout = ?config.stackit.timeout,
            refresh_interval = ?config.stackit.refresh_interval,
        );
    }

    Ok(config)
}

fn environment() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| match (k.into_string(), v.into_string()) {
            (Ok(k), Ok(v)) => Some((k, v)),
            _ => None,
        })
        .collect()
}

/// Replaces `$NAME`, `${NAME}` and `${NAME:-default}` with the value of the
/// environment variables, `$$` escapes a literal `$`.
fn interpolate<'a>(
    input: &'a str,
    vars: &HashMap<String, String>,
) -> Result<Cow<'a, str>, Vec<String>> {
    let mut errs = Vec::new();

    let interpolated = ENVIRONMENT_VARIABLE_INTERPOLATION_REGEX.replace_all(
        input,
        |caps: &Captures<'_>| {
            let Some(name) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
                return "$".to_string();
            };

            let value = vars.get(name).map(String::as_str);
            match (value, caps.get(3)) {
                (Some(value), Some(default)) if value.is_empty() => default.as_str().to_string(),
                (Some(value), _) => value.to_string(),
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => {
                    errs.push(format!(
                        "Missing environment variable in config. name = {name:?}"
                    ));
                    String::new()
                }
            }
        },
    );

    if errs.is_empty() {
        Ok(interpolated)
    } else {
        Err(errs)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use discovery::stackit::Role;
    use framework::http::Auth;
    use pretty_assertions::assert_eq;

    use super::*;

    fn vars() -> HashMap<String, String> {
        [
            ("FOO", "dogs"),
            ("FOOBAR", "cats"),
            ("FOO.BAR", "turtles"),
            ("EMPTY", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn interpolation() {
        let vars = vars();

        for (input, want) in [
            ("$FOO", "dogs"),
            ("${FOO}", "dogs"),
            ("${FOOBAR}", "cats"),
            ("x${FOOBAR}y", "xcatsy"),
            ("$ x", "$ x"),
            ("$$FOO", "$FOO"),
            ("$FOO=bar", "dogs=bar"),
            ("$FOO.BAR", "turtles"),
            ("${FOO x", "${FOO x"),
            ("${}", "${}"),
            ("${FOO:-cats}", "dogs"),
            ("${NOT:-dogs and cats}", "dogs and cats"),
            ("${NOT:-}", ""),
            ("${EMPTY:-cats}", "cats"),
            ("${EMPTY}", ""),
        ] {
            assert_eq!(interpolate(input, &vars).unwrap(), want, "{input}");
        }

        for input in ["x$FOOBARy", "$NOT_FOO", "${NOT}", "$NOT-FOO"] {
            assert!(interpolate(input, &vars).is_err(), "{input}");
        }
    }

    #[test]
    fn missing_variables_are_all_reported() {
        let errs = interpolate("$A $B ${FOO}", &vars()).unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(errs[0].contains("\"A\""));
        assert!(errs[1].contains("\"B\""));
    }

    #[test]
    fn load_config() {
        let vars = HashMap::from([
            ("STACKIT_PROJECT".to_string(), "p1".to_string()),
            ("STACKIT_TOKEN".to_string(), "secret".to_string()),
        ]);

        let config = load_from_str(
            r#"
stackit:
  role: mongodb_flex
  project: ${STACKIT_PROJECT}
  region: ${STACKIT_REGION:-eu02}
  auth:
    strategy: bearer
    token: ${STACKIT_TOKEN}
  refresh_interval: 2m

output: /tmp/stackit.json
"#,
            &vars,
        )
        .unwrap();

        assert_eq!(config.stackit.role, Role::MongoDbFlex);
        assert_eq!(config.stackit.project, "p1");
        assert_eq!(config.stackit.region, "eu02");
        assert_eq!(config.stackit.auth, Some(Auth::bearer("secret")));
        assert_eq!(config.stackit.refresh_interval, Duration::from_secs(120));
        assert_eq!(config.stackit.timeout, Duration::from_secs(10));
        assert_eq!(config.output, Some(PathBuf::from("/tmp/stackit.json")));
    }

    #[test]
    fn output_defaults_to_stdout() {
        let config = load_from_str(
            r#"
stackit:
  role: mongodb_flex
  project: p1
"#,
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(config.output, None);
    }

    #[test]
    fn invalid() {
        for input in [
            // unknown field
            "stackit:\n  role: mongodb_flex\n  project: p1\nfoo: bar\n",
            // missing project
            "stackit:\n  role: mongodb_flex\n",
            // missing section
            "output: /tmp/stackit.json\n",
            // missing variable
            "stackit:\n  role: mongodb_flex\n  project: $STACKIT_PROJECT\n",
            // bad duration
            "stackit:\n  role: mongodb_flex\n  project: p1\n  timeout: soon\n",
            // zero durations
            "stackit:\n  role: mongodb_flex\n  project: p1\n  refresh_interval: 0\n",
            "stackit:\n  role: mongodb_flex\n  project: p1\n  refresh_interval: 0s\n",
            "stackit:\n  role: mongodb_flex\n  project: p1\n  timeout: 0\n",
        ] {
            let result = load_from_str(input, &HashMap::new());
            assert!(result.is_err(), "{input}");
        }
    }

    #[test]
    fn zero_durations_are_all_reported() {
        let errs = load_from_str(
            "stackit:\n  role: mongodb_flex\n  project: p1\n  refresh_interval: 0\n  timeout: 0\n",
            &HashMap::new(),
        )
        .unwrap_err();

        assert_eq!(
            errs,
            vec![
                "stackit.refresh_interval must be greater than 0".to_string(),
                "stackit.timeout must be greater than 0".to_string(),
            ]
        );
    }

    #[test]
    fn missing_file() {
        let errs = load(Path::new("/path/to/nowhere/stackit.yaml")).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains("Could not read config file"));
    }
}
