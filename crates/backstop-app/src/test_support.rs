use std::collections::BTreeMap;

use backstop_core::model::{ActionBatch, ConcreteRule, Configuration, Rule};

pub fn sample_config() -> Configuration {
    let mut rules = BTreeMap::new();
    rules.insert("dev".to_string(), Rule::Merge(vec!["rust".to_string()]));
    rules.insert(
        "rust".to_string(),
        Rule::Concrete(ConcreteRule {
            excludes: vec!["target".to_string()],
            if_exists: vec!["Cargo.toml".to_string()],
        }),
    );

    Configuration {
        no_include: false,
        directories: Vec::new(),
        skips: vec!["/home/u/.cache".to_string()],
        rules,
    }
}

pub fn sample_batch() -> ActionBatch {
    ActionBatch {
        add: vec![
            "/home/u/src/app/target".to_string(),
            "/home/u/src/web/node_modules".to_string(),
            "/home/u/.cache/pip".to_string(),
        ],
        remove: vec![
            "/home/u/old/node_modules".to_string(),
            "/home/u/old/build".to_string(),
        ],
    }
}
