use clap::Parser;
use std::time::Duration;

/// Server settings shared by the acceptor and every session.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Marks the end of one message on the wire, in both directions.
    pub delimiter: String,
    /// Splits the command prefix and the `name=value` fields.
    pub separator: char,
    /// A session whose peer stays silent this long is treated as gone.
    pub idle_timeout: Duration,
    pub max_message_length: usize,
    /// Key peers by `ip:port` rather than by ip alone.
    pub key_with_port: bool,
    /// Answer every `set` with a bare delimiter.
    pub write_ack: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
            delimiter: "\n".to_string(),
            separator: ',',
            idle_timeout: Duration::from_secs(10),
            max_message_length: 4096,
            key_with_port: false,
            write_ack: true,
        }
    }
}

impl Config {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Shares named integer attributes between robots", long_about = None)]
pub struct Cli {
    /// Host to bind the listener to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,

    /// Message delimiter; `\n`, `\r` and `\t` escapes are understood.
    #[arg(long, default_value = "\\n")]
    pub delimiter: String,

    /// Field separator inside a message.
    #[arg(long, default_value_t = ',')]
    pub separator: char,

    /// Idle timeout in seconds before a silent peer is dropped.
    #[arg(short, long, default_value_t = 10)]
    pub timeout: u64,

    /// Longest accepted message in bytes, delimiter included.
    #[arg(long, default_value_t = 4096)]
    pub max_length: usize,

    /// Key peers by `ip:port` instead of ip only.
    #[arg(long)]
    pub key_with_port: bool,

    /// Don't send a bare delimiter back after `set`.
    #[arg(long)]
    pub no_write_ack: bool,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            bind: cli.bind,
            port: cli.port,
            delimiter: unescape(&cli.delimiter),
            separator: cli.separator,
            idle_timeout: Duration::from_secs(cli.timeout),
            max_message_length: cli.max_length,
            key_with_port: cli.key_with_port,
            write_ack: !cli.no_write_ack,
        }
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_config_defaults() {
        let config = Config::from(Cli::parse_from(["robot-directory"]));
        let default = Config::default();
        assert_eq!(config.listen_addr(), default.listen_addr());
        assert_eq!(config.delimiter, default.delimiter);
        assert_eq!(config.separator, default.separator);
        assert_eq!(config.idle_timeout, default.idle_timeout);
        assert_eq!(config.max_message_length, default.max_message_length);
        assert_eq!(config.key_with_port, default.key_with_port);
        assert_eq!(config.write_ack, default.write_ack);
    }

    #[test]
    fn parses_overrides() {
        let config = Config::from(Cli::parse_from([
            "robot-directory",
            "--port",
            "0",
            "--delimiter",
            "\\r\\n",
            "--separator",
            ";",
            "--timeout",
            "2",
            "--key-with-port",
            "--no-write-ack",
        ]));
        assert_eq!(config.port, 0);
        assert_eq!(config.delimiter, "\r\n");
        assert_eq!(config.separator, ';');
        assert_eq!(config.idle_timeout, Duration::from_secs(2));
        assert!(config.key_with_port);
        assert!(!config.write_ack);
    }

    #[test]
    fn unescape_keeps_unknown_sequences() {
        assert_eq!(unescape("\\a|\\t"), "\\a|\t");
        assert_eq!(unescape("end\\"), "end\\");
        assert_eq!(unescape("\u{7}\u{8}"), "\u{7}\u{8}");
    }
}
