use std::env;

use crate::error::{new_error_with, Error, ErrorKind};

const ENV_CPU: &str = "PERF_STOPWATCH_CPU";
const ENV_PID: &str = "PERF_STOPWATCH_PID";
const ENV_EXCLUDE_KERNEL: &str = "PERF_STOPWATCH_EXCLUDE_KERNEL";
const ENV_EXCLUDE_HV: &str = "PERF_STOPWATCH_EXCLUDE_HV";
const ENV_INHERIT: &str = "PERF_STOPWATCH_INHERIT";

/// Configure how the kernel counters backing a [`Registry`] are opened.
///
/// Unless specified, counters measure the calling process (and any children it
/// spawns afterwards) on any CPU, in user space only.
///
/// ```
/// # use perf_stopwatch::{CounterConfig, Registry};
/// let config = CounterConfig::default()
///     .exclude_kernel(false)
///     .inherit(false);
///
/// let registry = Registry::new(config);
/// ```
///
/// [`Registry`]: struct.Registry.html
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterConfig {
    cpu: Option<i32>,
    pid: Option<i32>,
    exclude_kernel: bool,
    exclude_hv: bool,
    inherit: bool,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            cpu: None,
            pid: None,
            exclude_kernel: true,
            exclude_hv: true,
            inherit: true,
        }
    }
}

impl CounterConfig {
    /// Specify the CPU number that counters are bound to.
    ///
    /// Defaults to all CPUs (`-1`).
    pub fn set_cpu(self, cpu: i32) -> Self {
        Self {
            cpu: Some(cpu),
            ..self
        }
    }

    /// Attach counters to the specified PID.
    ///
    /// # PID 0
    ///
    /// PID 0 is a magic value, attaching to it causes counters to measure the
    /// calling thread. This is the default.
    pub fn attach_to(self, pid: i32) -> Self {
        Self {
            pid: Some(pid),
            ..self
        }
    }

    /// Do not count events that happen in kernel space (default `true`).
    pub fn exclude_kernel(self, exclude: bool) -> Self {
        Self {
            exclude_kernel: exclude,
            ..self
        }
    }

    /// Do not count events that happen in the hypervisor (default `true`).
    pub fn exclude_hv(self, exclude: bool) -> Self {
        Self {
            exclude_hv: exclude,
            ..self
        }
    }

    /// Let threads and processes spawned after a counter is opened inherit it
    /// (default `true`).
    pub fn inherit(self, inherit: bool) -> Self {
        Self { inherit, ..self }
    }

    /// Build a configuration from the `PERF_STOPWATCH_*` environment
    /// variables, using the defaults for anything unset.
    ///
    /// | Variable                        | Meaning              |
    /// |---------------------------------|----------------------|
    /// | `PERF_STOPWATCH_CPU`            | [`set_cpu`]          |
    /// | `PERF_STOPWATCH_PID`            | [`attach_to`]        |
    /// | `PERF_STOPWATCH_EXCLUDE_KERNEL` | [`exclude_kernel`]   |
    /// | `PERF_STOPWATCH_EXCLUDE_HV`     | [`exclude_hv`]       |
    /// | `PERF_STOPWATCH_INHERIT`        | [`inherit`]          |
    ///
    /// [`set_cpu`]: #method.set_cpu
    /// [`attach_to`]: #method.attach_to
    /// [`exclude_kernel`]: #method.exclude_kernel
    /// [`exclude_hv`]: #method.exclude_hv
    /// [`inherit`]: #method.inherit
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup(ENV_CPU) {
            config = config.set_cpu(parse_int(ENV_CPU, &v)?);
        }
        if let Some(v) = lookup(ENV_PID) {
            config = config.attach_to(parse_int(ENV_PID, &v)?);
        }
        if let Some(v) = lookup(ENV_EXCLUDE_KERNEL) {
            config = config.exclude_kernel(parse_bool(ENV_EXCLUDE_KERNEL, &v)?);
        }
        if let Some(v) = lookup(ENV_EXCLUDE_HV) {
            config = config.exclude_hv(parse_bool(ENV_EXCLUDE_HV, &v)?);
        }
        if let Some(v) = lookup(ENV_INHERIT) {
            config = config.inherit(parse_bool(ENV_INHERIT, &v)?);
        }

        Ok(config)
    }

    /// The CPU to bind counters to, `-1` for any.
    pub fn cpu(&self) -> i32 {
        self.cpu.unwrap_or(-1)
    }

    /// The PID to measure, `0` for the calling thread.
    pub fn pid(&self) -> i32 {
        self.pid.unwrap_or(0)
    }

    /// Whether kernel space events are excluded.
    pub fn excludes_kernel(&self) -> bool {
        self.exclude_kernel
    }

    /// Whether hypervisor events are excluded.
    pub fn excludes_hv(&self) -> bool {
        self.exclude_hv
    }

    /// Whether child tasks inherit the counters.
    pub fn inherits(&self) -> bool {
        self.inherit
    }
}

fn parse_int(key: &str, value: &str) -> Result<i32, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| new_error_with(ErrorKind::InvalidConfig, format!("{}={:?}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(new_error_with(
            ErrorKind::InvalidConfig,
            format!("{}={:?}", key, value),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CounterConfig::default();
        assert_eq!(config.cpu(), -1);
        assert_eq!(config.pid(), 0);
        assert!(config.excludes_kernel());
        assert!(config.excludes_hv());
        assert!(config.inherits());
    }

    #[test]
    fn test_builder() {
        let config = CounterConfig::default()
            .set_cpu(2)
            .attach_to(1234)
            .exclude_hv(false)
            .inherit(false);

        assert_eq!(config.cpu(), 2);
        assert_eq!(config.pid(), 1234);
        assert!(config.excludes_kernel());
        assert!(!config.excludes_hv());
        assert!(!config.inherits());
    }

    #[test]
    fn test_from_lookup_empty() {
        assert_eq!(
            CounterConfig::from_lookup(lookup(&[])).unwrap(),
            CounterConfig::default()
        );
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = CounterConfig::from_lookup(lookup(&[
            (ENV_CPU, "3"),
            (ENV_EXCLUDE_KERNEL, "no"),
            (ENV_INHERIT, " OFF "),
        ]))
        .unwrap();

        assert_eq!(config.cpu(), 3);
        assert_eq!(config.pid(), 0);
        assert!(!config.excludes_kernel());
        assert!(config.excludes_hv());
        assert!(!config.inherits());
    }

    #[test]
    fn test_from_lookup_invalid() {
        let err = CounterConfig::from_lookup(lookup(&[(ENV_PID, "self")])).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidConfig);

        let err = CounterConfig::from_lookup(lookup(&[(ENV_EXCLUDE_HV, "maybe")])).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidConfig);
    }
}
