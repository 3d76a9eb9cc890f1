//! File access risk classifier.

use std::path::{Path, PathBuf};

use super::{PermissionAction, RiskAssessment, RiskLevel};
use crate::tools::file::path::normalize;

/// Files whose access is always blocked.
const CRITICAL_FILES: &[&str] = &[
    "/etc/passwd",
    "/etc/shadow",
    "/etc/sudoers",
    "/boot/grub/grub.cfg",
    "/etc/fstab",
    "/etc/hosts",
    "/etc/ssh/sshd_config",
];

/// Directories whose contents are system-owned.
const PROTECTED_DIRS: &[&str] = &[
    "/etc", "/usr", "/var", "/boot", "/sys", "/proc", "/dev", "/bin", "/sbin", "/lib", "/lib64",
    "/opt",
];

/// Kind of file access being assessed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Delete,
}

/// Classifies file access by target path: critical files block, protected
/// directories block writes and prompt reads, paths outside the working
/// directory prompt, everything else is safe.
pub struct FileAccessClassifier {
    working_directory: PathBuf,
}

impl FileAccessClassifier {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
        }
    }

    pub fn assess(&self, file_path: &str, operation: FileOperation) -> RiskAssessment {
        if file_path.trim().is_empty() {
            return RiskAssessment::new(RiskLevel::Medium, PermissionAction::Block)
                .reason("Invalid file path")
                .warning("Cannot resolve file path")
                .suggestion("Check path syntax");
        }

        let raw = Path::new(file_path);
        let resolved = if raw.is_absolute() {
            normalize(raw)
        } else {
            normalize(&self.working_directory.join(raw))
        };

        if CRITICAL_FILES.iter().any(|f| resolved == Path::new(f)) {
            return RiskAssessment::new(RiskLevel::Critical, PermissionAction::Block)
                .reason(format!("Access to critical system file: {}", resolved.display()))
                .warning("This file is critical for system operation")
                .suggestion("System files should only be modified by administrators");
        }

        for dir in PROTECTED_DIRS {
            if resolved.starts_with(dir) {
                let (risk, action) = match operation {
                    FileOperation::Write | FileOperation::Delete => {
                        (RiskLevel::High, PermissionAction::Block)
                    }
                    FileOperation::Read => (RiskLevel::Medium, PermissionAction::Prompt),
                };
                return RiskAssessment::new(risk, action)
                    .reason(format!("Access to protected directory: {}", dir))
                    .warning("This directory contains system files")
                    .suggestion("Ensure you have proper permissions");
            }
        }

        if !resolved.starts_with(&self.working_directory) {
            return RiskAssessment::new(RiskLevel::Medium, PermissionAction::Prompt)
                .reason("File outside working directory")
                .warning(format!(
                    "File is outside the current working directory: {}",
                    self.working_directory.display()
                ))
                .suggestion("Consider if access to external files is necessary");
        }

        RiskAssessment::new(RiskLevel::Safe, PermissionAction::Allow)
            .reason("File access within working directory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> FileAccessClassifier {
        FileAccessClassifier::new("/home/dev/project")
    }

    #[test]
    fn critical_file_blocks_any_operation() {
        for op in [FileOperation::Read, FileOperation::Write, FileOperation::Delete] {
            let a = classifier().assess("/etc/passwd", op);
            assert_eq!(a.risk_level, RiskLevel::Critical);
            assert_eq!(a.action, PermissionAction::Block);
        }
    }

    #[test]
    fn protected_dir_write_blocks_read_prompts() {
        let write = classifier().assess("/etc/myapp.conf", FileOperation::Write);
        assert_eq!(
            (write.risk_level, write.action),
            (RiskLevel::High, PermissionAction::Block)
        );
        let read = classifier().assess("/usr/share/doc/readme", FileOperation::Read);
        assert_eq!(
            (read.risk_level, read.action),
            (RiskLevel::Medium, PermissionAction::Prompt)
        );
    }

    #[test]
    fn outside_working_directory_prompts() {
        let a = classifier().assess("/home/other/file.txt", FileOperation::Read);
        assert_eq!(
            (a.risk_level, a.action),
            (RiskLevel::Medium, PermissionAction::Prompt)
        );
    }

    #[test]
    fn inside_working_directory_allows() {
        let a = classifier().assess("src/main.rs", FileOperation::Write);
        assert_eq!(
            (a.risk_level, a.action),
            (RiskLevel::Safe, PermissionAction::Allow)
        );
    }

    #[test]
    fn traversal_out_of_working_dir_is_caught() {
        let a = classifier().assess("../../../etc/passwd", FileOperation::Read);
        assert_eq!(a.action, PermissionAction::Block);
    }
}
