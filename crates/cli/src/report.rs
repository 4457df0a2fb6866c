use sitepush_deployer::Reporter;
use std::io::IsTerminal;

const RESET: &str = "\x1b[0m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";

/// Progress lines on stdout, coloured when stdout is a terminal
pub struct TerminalReporter {
    color: bool,
}

impl TerminalReporter {
    pub fn stdout() -> Self {
        Self {
            color: std::io::stdout().is_terminal(),
        }
    }

    fn line(&self, color: &str, symbol: &str, message: &str) -> String {
        if self.color {
            format!("{color}{symbol} {message}{RESET}")
        } else {
            format!("{symbol} {message}")
        }
    }
}

impl Reporter for TerminalReporter {
    fn info(&self, message: &str) {
        println!("{}", self.line(BLUE, "ℹ", message));
    }

    fn success(&self, message: &str) {
        println!("{}", self.line(GREEN, "✓", message));
    }

    fn warning(&self, message: &str) {
        println!("{}", self.line(YELLOW, "⚠", message));
    }

    fn error(&self, message: &str) {
        println!("{}", self.line(RED, "✗", message));
    }
}
