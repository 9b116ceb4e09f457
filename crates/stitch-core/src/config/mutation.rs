//! Safe mutation of a single configuration file.
//!
//! One call walks `BackingUp → Reading → Mutating → Writing → Validating` and, when
//! the written file fails validation, `RollingBack`. There are no retries: a call is a
//! single attempt. Each phase is logged at debug level with the destination path.

use std::fmt;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::client_config::ConfigSerializer;
use crate::error::StitchError;
use crate::fs::{BackupRecord, BackupStyle, Snapshot, atomic_write, read_optional};

/// How to treat existing content that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsePolicy {
    /// Unparsable content is replaced by an empty document (upserts).
    #[default]
    Lenient,
    /// Unparsable content aborts the call with `StitchError::Parse` (removals).
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    BackingUp,
    Reading,
    Mutating,
    Writing,
    Validating,
    RollingBack,
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationPhase::BackingUp => "backing-up",
            MutationPhase::Reading => "reading",
            MutationPhase::Mutating => "mutating",
            MutationPhase::Writing => "writing",
            MutationPhase::Validating => "validating",
            MutationPhase::RollingBack => "rolling-back",
        };
        f.write_str(name)
    }
}

type Validator<'a> = Box<dyn Fn(&Map<String, Value>) -> Result<(), String> + 'a>;

/// Backup, read, mutate, write atomically, re-read and validate one file.
pub struct SafeMutation<'a> {
    path: &'a Path,
    serializer: &'a dyn ConfigSerializer,
    backup: bool,
    policy: ParsePolicy,
    validator: Option<Validator<'a>>,
}

impl fmt::Debug for SafeMutation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeMutation")
            .field("path", &self.path)
            .field("format", &self.serializer.format())
            .field("backup", &self.backup)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<'a> SafeMutation<'a> {
    pub fn new(path: &'a Path, serializer: &'a dyn ConfigSerializer) -> Self {
        Self {
            path,
            serializer,
            backup: false,
            policy: ParsePolicy::Lenient,
            validator: None,
        }
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_policy(mut self, policy: ParsePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shape check run against the re-parsed document after the write.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<(), String> + 'a,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Run the protocol. On success the returned snapshot can undo the write.
    pub fn apply<F>(self, mutate: F) -> Result<Snapshot, StitchError>
    where
        F: FnOnce(&mut Map<String, Value>) -> Result<(), StitchError>,
    {
        let path = self.path;

        self.trace(MutationPhase::BackingUp);
        let backup = if self.backup && path.is_file() {
            Some(BackupRecord::create(path, BackupStyle::Target)?)
        } else {
            None
        };

        // A backup is only an audit record of a write that happened.
        let abort = |err: StitchError| {
            if let Some(record) = &backup {
                record.discard();
            }
            err
        };

        self.trace(MutationPhase::Reading);
        let original = read_optional(path).map_err(abort)?;
        // The parsed document plus the text it came from, when that text is worth editing.
        let (mut document, baseline) = match &original {
            None => (Map::new(), None),
            Some(bytes) => {
                let content = String::from_utf8_lossy(bytes);
                match self.serializer.parse_document(path, &content) {
                    Ok(document) if content.trim().is_empty() => (document, None),
                    Ok(document) => {
                        let baseline = (content.into_owned(), document.clone());
                        (document, Some(baseline))
                    }
                    Err(err) => match self.policy {
                        ParsePolicy::Strict => return Err(abort(err)),
                        ParsePolicy::Lenient => {
                            warn!(
                                path = %path.display(),
                                error = %err,
                                "existing config is unparsable; starting from an empty document"
                            );
                            (Map::new(), None)
                        }
                    },
                }
            }
        };

        self.trace(MutationPhase::Mutating);
        if let Err(err) = mutate(&mut document) {
            return Err(abort(err));
        }

        self.trace(MutationPhase::Writing);
        let rendered = match &baseline {
            Some((text, parsed)) => self.serializer.render_edit(text, parsed, &document),
            None => self.serializer.render(&document),
        };
        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(err) => {
                return Err(abort(StitchError::Serialize {
                    format: self.serializer.format().as_str(),
                    message: err.0,
                }));
            }
        };
        if let Err(err) = atomic_write(path, rendered.as_bytes()) {
            return Err(abort(err));
        }

        let snapshot = Snapshot {
            path: path.to_path_buf(),
            original,
            backup,
        };

        self.trace(MutationPhase::Validating);
        if let Err(message) = self.validate_written() {
            self.trace(MutationPhase::RollingBack);
            return Err(match snapshot.restore() {
                Ok(_) => StitchError::Validation {
                    path: path.to_path_buf(),
                    message,
                },
                Err(rollback) => StitchError::RollbackFailure {
                    path: path.to_path_buf(),
                    validation: message,
                    rollback: rollback.to_string(),
                },
            });
        }

        Ok(snapshot)
    }

    fn validate_written(&self) -> Result<(), String> {
        let content = std::fs::read_to_string(self.path)
            .map_err(|e| format!("could not re-read written file: {}", e))?;
        let document = self
            .serializer
            .parse(&content)
            .map_err(|e| format!("written file does not parse: {}", e))?;
        match &self.validator {
            Some(validator) => validator(&document),
            None => Ok(()),
        }
    }

    fn trace(&self, phase: MutationPhase) {
        debug!(path = %self.path.display(), %phase, "safe mutation");
    }
}
