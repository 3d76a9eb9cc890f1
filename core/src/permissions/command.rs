//! Shell command risk classifier.
//!
//! Pattern tables are checked in a fixed order (critical, high, medium, safe,
//! network, file-write, fallback); the first hit wins, so the classifier is
//! total: every input maps to exactly one (level, action) pair.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use super::{PermissionAction, RiskAssessment, RiskLevel};

fn build(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("classifier pattern must compile")
        })
        .collect()
}

static CRITICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    build(&[
        r"\brm\s+-rf\s+/\s*$",
        r"\brm\s+-rf\s+/\s",
        r"\bdd\s+if=/dev/(zero|random|urandom)\s+of=/dev/sd",
        r"\bmkfs\.",
        r"\bfdisk\s+/dev/",
        r"\bsudo\s+rm\s+-rf\s+/",
        r":\(\)\{\s*:\|:\s*&\s*\};:",
    ])
});

static HIGH_RISK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    build(&[
        r"\brm\s+-rf\s+",
        r"\bsudo\s+",
        r"\bsu\s+",
        r"\bchmod\s+777\b",
        r"\bchown\s+",
        r">\s*/dev/sd[a-z]",
        r"\bcrontab\s+",
        r"\bkill\s+-9\b",
        r"\bpkill\s+",
        r"\bkillall\s+",
    ])
});

static MEDIUM_RISK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    build(&[
        r"\brm\s+[^\n]*\*",
        r"\bmv\s+[^\n]*\*",
        r"\bcp\s+-r\s+",
        r"\bfind\s+[^\n]*-delete",
        r"\bxargs\s+rm\b",
        r">\s*/etc/",
        r"\bgit\s+reset\s+--hard",
        r"\bgit\s+clean\s+-f",
    ])
});

static SAFE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    build(&[
        r"^ls(\s|$)",
        r"^cat\s+",
        r"^head\s+",
        r"^tail\s+",
        r"^grep\s+",
        r"^git\s+status",
        r"^git\s+log",
        r"^git\s+diff",
        r"^pwd$",
        r"^whoami$",
        r"^date$",
        r"^echo\s+",
        r"^which\s+",
        r"^type\s+",
    ])
});

static NETWORK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    build(&[
        r"\bcurl\s+",
        r"\bwget\s+",
        r"\bssh\s+",
        r"\bscp\s+",
        r"\bftp\s+",
        r"\btelnet\s+",
        r"\bnc\s+",
    ])
});

static FILE_WRITE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    build(&[
        r">\s*[^>\s]",
        r">>\s*",
        r"\bcp\s+",
        r"\bmv\s+",
        r"\btouch\s+",
        r"\bmkdir\s+",
    ])
});

/// Classifies shell commands by risk. Stateless; pattern tables are compiled
/// once per process.
#[derive(Default)]
pub struct CommandClassifier;

impl CommandClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classifies one command string. First matching tier wins.
    pub fn classify(&self, command: &str) -> RiskAssessment {
        let command = command.trim();

        if command.is_empty() {
            return RiskAssessment::new(RiskLevel::Safe, PermissionAction::Allow)
                .reason("Empty command");
        }

        for pattern in CRITICAL_PATTERNS.iter() {
            if pattern.is_match(command) {
                return RiskAssessment::new(RiskLevel::Critical, PermissionAction::Block)
                    .reason(format!("Critical operation detected: {}", pattern.as_str()))
                    .warning("This command could cause severe system damage")
                    .suggestion("Consider if this operation is really necessary");
            }
        }

        for pattern in HIGH_RISK_PATTERNS.iter() {
            if pattern.is_match(command) {
                return RiskAssessment::new(RiskLevel::High, PermissionAction::Prompt)
                    .reason(format!("High-risk operation: {}", pattern.as_str()))
                    .warning("This command requires elevated privileges or could cause data loss")
                    .suggestion("Verify the command parameters carefully");
            }
        }

        for pattern in MEDIUM_RISK_PATTERNS.iter() {
            if pattern.is_match(command) {
                return RiskAssessment::new(RiskLevel::Medium, PermissionAction::Prompt)
                    .reason(format!("Medium-risk operation: {}", pattern.as_str()))
                    .warning("This command could modify or delete files")
                    .suggestion("Double-check file paths and parameters");
            }
        }

        for pattern in SAFE_PATTERNS.iter() {
            if pattern.is_match(command) {
                return RiskAssessment::new(RiskLevel::Safe, PermissionAction::Allow)
                    .reason("Safe read-only operation");
            }
        }

        if NETWORK_PATTERNS.iter().any(|p| p.is_match(command)) {
            return RiskAssessment::new(RiskLevel::Medium, PermissionAction::Prompt)
                .reason("Network operation detected")
                .warning("This command will make network connections")
                .suggestion("Verify network destinations are trusted");
        }

        if FILE_WRITE_PATTERNS.iter().any(|p| p.is_match(command)) {
            return RiskAssessment::new(RiskLevel::Low, PermissionAction::Prompt)
                .reason("File modification operation")
                .warning("This command will modify the filesystem")
                .suggestion("Ensure you have backups of important files");
        }

        RiskAssessment::new(RiskLevel::Low, PermissionAction::Allow)
            .reason("Unknown command pattern")
            .warning("Command pattern not recognized")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(cmd: &str) -> (RiskLevel, PermissionAction) {
        let a = CommandClassifier::new().classify(cmd);
        (a.risk_level, a.action)
    }

    #[test]
    fn critical_commands_block() {
        assert_eq!(
            classify("sudo rm -rf /"),
            (RiskLevel::Critical, PermissionAction::Block)
        );
        assert_eq!(
            classify("rm -rf /"),
            (RiskLevel::Critical, PermissionAction::Block)
        );
        assert_eq!(
            classify("mkfs.ext4 /dev/sda1"),
            (RiskLevel::Critical, PermissionAction::Block)
        );
        assert_eq!(
            classify(":(){ :|: & };:"),
            (RiskLevel::Critical, PermissionAction::Block)
        );
    }

    #[test]
    fn high_risk_commands_prompt() {
        assert_eq!(
            classify("sudo apt install foo"),
            (RiskLevel::High, PermissionAction::Prompt)
        );
        assert_eq!(
            classify("rm -rf ./build"),
            (RiskLevel::High, PermissionAction::Prompt)
        );
        assert_eq!(
            classify("chmod 777 script.sh"),
            (RiskLevel::High, PermissionAction::Prompt)
        );
    }

    #[test]
    fn medium_risk_commands_prompt() {
        assert_eq!(
            classify("rm *.log"),
            (RiskLevel::Medium, PermissionAction::Prompt)
        );
        assert_eq!(
            classify("git reset --hard HEAD~3"),
            (RiskLevel::Medium, PermissionAction::Prompt)
        );
        assert_eq!(
            classify("find . -name '*.tmp' -delete"),
            (RiskLevel::Medium, PermissionAction::Prompt)
        );
    }

    #[test]
    fn safe_commands_allow() {
        assert_eq!(classify("ls -la"), (RiskLevel::Safe, PermissionAction::Allow));
        assert_eq!(
            classify("git status"),
            (RiskLevel::Safe, PermissionAction::Allow)
        );
        assert_eq!(classify("pwd"), (RiskLevel::Safe, PermissionAction::Allow));
    }

    #[test]
    fn network_commands_prompt() {
        assert_eq!(
            classify("curl https://x"),
            (RiskLevel::Medium, PermissionAction::Prompt)
        );
        assert_eq!(
            classify("ssh host uptime"),
            (RiskLevel::Medium, PermissionAction::Prompt)
        );
    }

    #[test]
    fn file_write_commands_prompt_low() {
        assert_eq!(
            classify("touch notes.txt"),
            (RiskLevel::Low, PermissionAction::Prompt)
        );
        assert_eq!(
            classify("mkdir -p a/b"),
            (RiskLevel::Low, PermissionAction::Prompt)
        );
    }

    #[test]
    fn unknown_commands_fall_through_to_low_allow() {
        assert_eq!(
            classify("cargo metadata"),
            (RiskLevel::Low, PermissionAction::Allow)
        );
        assert_eq!(classify(""), (RiskLevel::Safe, PermissionAction::Allow));
    }
}
