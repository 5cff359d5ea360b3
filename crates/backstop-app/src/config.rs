use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use backstop_core::graph::{Derived, Lens, LensFamily, State};
use backstop_core::model::{Configuration, Directory, Rule};
use tracing::debug;

/// Writes into the draft through whatever it currently resolves to.
///
/// Edits are dropped while no configuration has been loaded.
#[derive(Clone)]
struct DraftWriter {
    draft: Derived<Option<Configuration>>,
    edited: State<Option<Configuration>>,
}

impl DraftWriter {
    fn write<F>(&self, field: &'static str, edit: F) -> bool
    where
        F: FnOnce(&mut Configuration),
    {
        let current = self.draft.get();
        let Some(config) = current.as_ref() else {
            debug!(field, "configuration not loaded; ignoring draft write");
            return false;
        };

        let mut next = config.clone();
        edit(&mut next);
        self.edited.set(Some(next));
        true
    }
}

fn field_lens<T, G, S>(
    label: &'static str,
    writer: &DraftWriter,
    read: G,
    write: S,
) -> Lens<T>
where
    T: PartialEq + 'static,
    G: Fn(Option<&Configuration>) -> T + 'static,
    S: Fn(&mut Configuration, T) + 'static,
{
    let source = writer.draft.clone();
    let node = Derived::memoized(
        label,
        vec![writer.draft.dependency()],
        move || read((*source.get()).as_ref()),
        |next, previous| next == previous,
    );
    let writer = writer.clone();
    Lens::new(node, move |value| {
        writer.write(label, |config| write(config, value));
    })
}

/// The draft/final configuration pair and every view derived from it.
pub struct ConfigStore {
    final_config: State<Option<Configuration>>,
    edited: State<Option<Configuration>>,
    draft: Lens<Option<Configuration>>,
    rules: Lens<BTreeMap<String, Rule>>,
    directories: Lens<Vec<Directory>>,
    skips: Lens<Vec<String>>,
    no_include: Lens<bool>,
    rule: LensFamily<String, Option<Rule>>,
    directory: LensFamily<String, Option<Directory>>,
    rule_names: Derived<Vec<String>>,
    all_paths: Derived<Vec<String>>,
    dirty: Derived<bool>,
    pub(crate) kind_cache: RefCell<HashMap<String, Rule>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        let final_config = State::new("final_config", None::<Configuration>);
        let edited = State::new("draft_edit", None::<Configuration>);

        let draft_node = {
            let final_config = final_config.clone();
            let edited = edited.clone();
            Derived::memoized(
                "draft_config",
                vec![final_config.dependency(), edited.dependency()],
                move || match edited.get().as_ref() {
                    Some(config) => Some(config.clone()),
                    None => (*final_config.get()).clone(),
                },
                |next, previous| next == previous,
            )
        };
        let writer = DraftWriter {
            draft: draft_node.clone(),
            edited: edited.clone(),
        };
        let draft = {
            let edited = edited.clone();
            Lens::new(draft_node.clone(), move |value| edited.set(value))
        };

        let rules = field_lens(
            "rules",
            &writer,
            |config| config.map(|config| config.rules.clone()).unwrap_or_default(),
            |config, rules| config.rules = rules,
        );
        let directories = field_lens(
            "directories",
            &writer,
            |config| {
                config
                    .map(|config| config.directories.clone())
                    .unwrap_or_default()
            },
            |config, directories| config.directories = directories,
        );
        let skips = field_lens(
            "skips",
            &writer,
            |config| config.map(|config| config.skips.clone()).unwrap_or_default(),
            |config, skips| config.skips = skips,
        );
        let no_include = field_lens(
            "no_include",
            &writer,
            |config| config.is_some_and(|config| config.no_include),
            |config, value| config.no_include = value,
        );

        let rule = {
            let draft = draft_node.clone();
            let writer = writer.clone();
            LensFamily::new(
                move |name: &String| {
                    let source = draft.clone();
                    let name = name.clone();
                    Derived::memoized(
                        "rule",
                        vec![draft.dependency()],
                        move || {
                            (*source.get())
                                .as_ref()
                                .and_then(|config| config.rules.get(&name).cloned())
                        },
                        |next, previous| next == previous,
                    )
                },
                move |name: &String, value: Option<Rule>| {
                    writer.write("rule", |config| match value {
                        Some(rule) => {
                            config.rules.insert(name.clone(), rule);
                        }
                        None => {
                            config.rules.remove(name);
                        }
                    });
                },
            )
        };

        let directory = {
            let draft = draft_node.clone();
            let writer = writer.clone();
            LensFamily::new(
                move |path: &String| {
                    let source = draft.clone();
                    let path = path.clone();
                    Derived::memoized(
                        "directory",
                        vec![draft.dependency()],
                        move || {
                            (*source.get())
                                .as_ref()
                                .and_then(|config| config.directory(&path).cloned())
                        },
                        |next, previous| next == previous,
                    )
                },
                move |path: &String, value: Option<Directory>| {
                    writer.write("directory", |config| match value {
                        Some(directory) => {
                            match config
                                .directories
                                .iter_mut()
                                .find(|existing| existing.path == *path)
                            {
                                Some(existing) => *existing = directory,
                                None => config.directories.push(directory),
                            }
                        }
                        None => config.directories.retain(|existing| existing.path != *path),
                    });
                },
            )
        };

        let rule_names = {
            let rules = rules.clone();
            Derived::memoized(
                "rule_names",
                vec![rules.dependency()],
                move || rules.get().keys().cloned().collect::<Vec<_>>(),
                |next, previous| next == previous,
            )
        };

        let all_paths = {
            let final_config = final_config.clone();
            Derived::memoized(
                "all_paths",
                vec![final_config.dependency()],
                move || collect_rule_paths((*final_config.get()).as_ref()),
                |next, previous| next == previous,
            )
        };

        let dirty = {
            let draft = draft_node.clone();
            let final_config = final_config.clone();
            Derived::memoized(
                "dirty",
                vec![draft_node.dependency(), final_config.dependency()],
                move || *draft.get() != *final_config.get(),
                |next, previous| next == previous,
            )
        };

        Self {
            final_config,
            edited,
            draft,
            rules,
            directories,
            skips,
            no_include,
            rule,
            directory,
            rule_names,
            all_paths,
            dirty,
            kind_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn final_config(&self) -> Rc<Option<Configuration>> {
        self.final_config.get()
    }

    pub fn draft(&self) -> Rc<Option<Configuration>> {
        self.draft.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.final_config.get().is_some()
    }

    pub fn is_dirty(&self) -> bool {
        *self.dirty.get()
    }

    pub fn dirty(&self) -> &Derived<bool> {
        &self.dirty
    }

    pub fn draft_lens(&self) -> &Lens<Option<Configuration>> {
        &self.draft
    }

    pub fn rules(&self) -> &Lens<BTreeMap<String, Rule>> {
        &self.rules
    }

    pub fn directories(&self) -> &Lens<Vec<Directory>> {
        &self.directories
    }

    pub fn skips(&self) -> &Lens<Vec<String>> {
        &self.skips
    }

    pub fn no_include(&self) -> &Lens<bool> {
        &self.no_include
    }

    pub fn rule(&self) -> &LensFamily<String, Option<Rule>> {
        &self.rule
    }

    pub fn directory(&self) -> &LensFamily<String, Option<Directory>> {
        &self.directory
    }

    /// Rule names in sorted order. Re-reads after edits that keep the same
    /// set of names return the same allocation.
    pub fn rule_names(&self) -> Rc<Vec<String>> {
        self.rule_names.get()
    }

    pub fn rule_names_node(&self) -> &Derived<Vec<String>> {
        &self.rule_names
    }

    /// Every concrete exclude and marker path of the saved configuration.
    pub fn all_paths(&self) -> Rc<Vec<String>> {
        self.all_paths.get()
    }

    /// Drops local edits; the draft mirrors the saved configuration again.
    pub fn reset(&self) {
        self.edited.set(None);
        self.kind_cache.borrow_mut().clear();
        debug!("draft configuration reset");
    }

    pub(crate) fn replace_final(&self, config: Configuration) {
        self.final_config.set(Some(config));
    }
}

fn collect_rule_paths(config: Option<&Configuration>) -> Vec<String> {
    let Some(config) = config else {
        return Vec::new();
    };

    let mut paths: Vec<String> = config
        .rules
        .values()
        .filter_map(|rule| match rule {
            Rule::Concrete(concrete) => Some(concrete),
            Rule::Merge(_) => None,
        })
        .flat_map(|concrete| concrete.excludes.iter().chain(concrete.if_exists.iter()))
        .cloned()
        .collect();
    paths.sort();
    paths.dedup();
    paths
}
