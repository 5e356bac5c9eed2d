use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Describes how to launch the data-fetch service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub(crate) program: OsString,
    pub(crate) args: Vec<OsString>,
    pub(crate) timeout: Duration,
    pub(crate) working_dir: Option<PathBuf>,
}

impl BridgeConfig {
    /// Creates a configuration that runs `program` with no arguments.
    pub fn new<S: Into<OsString>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            timeout: DEFAULT_TIMEOUT,
            working_dir: None,
        }
    }

    /// Parses a whitespace-separated command line such as
    /// `python3 yfinance_service.py`.
    ///
    /// Quoting is not interpreted. Returns `None` for a blank line.
    pub fn from_command_line(cmdline: &str) -> Option<Self> {
        let mut parts = cmdline.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).with_args(parts))
    }

    /// Appends arguments passed to the program.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the hard limit for a single invocation.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the working directory of the spawned process.
    #[inline]
    pub fn with_working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Returns the per-invocation timeout.
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command_line() {
        let config =
            BridgeConfig::from_command_line("  python3  yfinance_service.py ")
                .unwrap();
        assert_eq!(config.program, "python3");
        assert_eq!(config.args, vec![OsString::from("yfinance_service.py")]);
        assert_eq!(config.timeout(), Duration::from_secs(15));
        assert!(config.working_dir.is_none());

        assert!(BridgeConfig::from_command_line("   ").is_none());
    }
}
