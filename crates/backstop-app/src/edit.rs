use backstop_core::model::{Directory, Rule, RuleKind};
use backstop_core::names::{NameError, normalize_path, normalize_rule_name};
use thiserror::Error;
use tracing::debug;

use crate::config::ConfigStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("configuration has not been loaded yet")]
    NotLoaded,
    #[error(transparent)]
    InvalidName(#[from] NameError),
    #[error("rule '{name}' already exists")]
    DuplicateRule { name: String },
    #[error("rule '{name}' does not exist")]
    UnknownRule { name: String },
    #[error("rule is already named '{name}'")]
    UnchangedName { name: String },
    #[error("path must not be empty")]
    EmptyPath,
    #[error("directory '{path}' is already watched")]
    DuplicateDirectory { path: String },
    #[error("directory '{path}' is not watched")]
    UnknownDirectory { path: String },
    #[error("'{path}' is already skipped")]
    DuplicateSkip { path: String },
    #[error("'{path}' is not skipped")]
    UnknownSkip { path: String },
}

impl ConfigStore {
    fn ensure_loaded(&self) -> Result<(), EditError> {
        if self.draft().is_none() {
            return Err(EditError::NotLoaded);
        }
        Ok(())
    }

    fn existing_rule(&self, name: &str) -> Result<Rule, EditError> {
        self.ensure_loaded()?;
        self.rules()
            .get()
            .get(name)
            .cloned()
            .ok_or_else(|| EditError::UnknownRule {
                name: name.to_string(),
            })
    }

    /// Adds an empty merge rule and returns the normalized name.
    pub fn add_rule(&self, name: &str) -> Result<String, EditError> {
        self.ensure_loaded()?;
        let name = normalize_rule_name(name)?;
        if self.rules().get().contains_key(&name) {
            return Err(EditError::DuplicateRule { name });
        }

        self.rule().set(&name, Some(Rule::empty(RuleKind::Merge)));
        debug!(rule = %name, "rule added");
        Ok(name)
    }

    pub fn rename_rule(&self, old: &str, new: &str) -> Result<String, EditError> {
        let value = self.existing_rule(old)?;
        let new = normalize_rule_name(new)?;
        if new == old {
            return Err(EditError::UnchangedName { name: new });
        }
        if self.rules().get().contains_key(&new) {
            return Err(EditError::DuplicateRule { name: new });
        }

        self.rules().update(|rules| {
            rules.remove(old);
            rules.insert(new.clone(), value);
        });

        let mut cache = self.kind_cache.borrow_mut();
        if let Some(previous) = cache.remove(old) {
            cache.insert(new.clone(), previous);
        }
        debug!(from = old, to = %new, "rule renamed");
        Ok(new)
    }

    pub fn remove_rule(&self, name: &str) -> Result<Rule, EditError> {
        let value = self.existing_rule(name)?;
        self.rule().set(&name.to_string(), None);
        self.kind_cache.borrow_mut().remove(name);
        debug!(rule = name, "rule removed");
        Ok(value)
    }

    pub fn set_rule(&self, name: &str, rule: Rule) -> Result<(), EditError> {
        self.existing_rule(name)?;
        self.rule().set(&name.to_string(), Some(rule));
        Ok(())
    }

    /// Switches a rule between concrete and merge form.
    ///
    /// The value being replaced is kept as a one-level undo: switching back
    /// restores it verbatim, otherwise the new kind starts empty.
    pub fn toggle_rule_kind(&self, name: &str, kind: RuleKind) -> Result<Rule, EditError> {
        let current = self.existing_rule(name)?;
        if current.kind() == kind {
            return Ok(current);
        }

        let next = {
            let mut cache = self.kind_cache.borrow_mut();
            let next = match cache.remove(name) {
                Some(previous) if previous.kind() == kind => previous,
                _ => Rule::empty(kind),
            };
            cache.insert(name.to_string(), current);
            next
        };

        self.rule().set(&name.to_string(), Some(next.clone()));
        debug!(rule = name, kind = kind.label(), "rule kind switched");
        Ok(next)
    }

    pub fn add_directory(&self, path: &str) -> Result<String, EditError> {
        self.ensure_loaded()?;
        let path = normalize_path(path).ok_or(EditError::EmptyPath)?;
        if self.directories().get().iter().any(|dir| dir.path == path) {
            return Err(EditError::DuplicateDirectory { path });
        }

        self.directories()
            .update(|directories| directories.push(Directory::new(path.clone())));
        Ok(path)
    }

    pub fn remove_directory(&self, path: &str) -> Result<Directory, EditError> {
        self.ensure_loaded()?;
        let existing = self.directory().get(&path.to_string());
        let directory = (*existing)
            .clone()
            .ok_or_else(|| EditError::UnknownDirectory {
                path: path.to_string(),
            })?;

        self.directory().set(&path.to_string(), None);
        Ok(directory)
    }

    pub fn set_directory_rules(&self, path: &str, rules: Vec<String>) -> Result<(), EditError> {
        self.ensure_loaded()?;
        let key = path.to_string();
        let existing = self.directory().get(&key);
        let Some(directory) = existing.as_ref() else {
            return Err(EditError::UnknownDirectory { path: key });
        };

        let mut next = directory.clone();
        next.rules = rules;
        self.directory().set(&key, Some(next));
        Ok(())
    }

    pub fn add_skip(&self, path: &str) -> Result<String, EditError> {
        self.ensure_loaded()?;
        let path = normalize_path(path).ok_or(EditError::EmptyPath)?;
        if self.skips().get().contains(&path) {
            return Err(EditError::DuplicateSkip { path });
        }

        self.skips().update(|skips| skips.push(path.clone()));
        Ok(path)
    }

    pub fn remove_skip(&self, path: &str) -> Result<(), EditError> {
        self.ensure_loaded()?;
        if !self.skips().get().iter().any(|skip| skip == path) {
            return Err(EditError::UnknownSkip {
                path: path.to_string(),
            });
        }

        self.skips().update(|skips| skips.retain(|skip| skip != path));
        Ok(())
    }

    pub fn set_no_include(&self, value: bool) -> Result<(), EditError> {
        self.ensure_loaded()?;
        self.no_include().set(value);
        Ok(())
    }
}
