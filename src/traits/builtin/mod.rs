//! Built-in traits
//!
//! One module per trait. Each module exposes its `ID` and a `new_trait` factory.

pub mod affinity;
pub mod camel;
pub mod container;
pub mod cron;
pub mod dependencies;
pub mod deployment;
pub mod environment;
pub mod gc;
pub mod health;
pub mod init;
pub mod init_containers;
pub mod istio;
pub mod jvm;
pub mod keda;
pub mod knative_service;
pub mod owner;
pub mod pdb;
pub mod platform;
pub mod service;
pub mod toleration;

use super::TraitFactory;

/// Factories of every built-in trait, addons last
pub fn factories() -> Vec<TraitFactory> {
    vec![
        init::new_trait,
        platform::new_trait,
        camel::new_trait,
        dependencies::new_trait,
        environment::new_trait,
        pdb::new_trait,
        cron::new_trait,
        deployment::new_trait,
        gc::new_trait,
        toleration::new_trait,
        affinity::new_trait,
        knative_service::new_trait,
        service::new_trait,
        container::new_trait,
        init_containers::new_trait,
        health::new_trait,
        jvm::new_trait,
        istio::new_trait,
        owner::new_trait,
        keda::new_trait,
    ]
}

/// Split a command line on whitespace, keeping double quoted sections together
pub(crate) fn split_command(command: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for c in command.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    parts.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        parts.push(current);
    }
    parts
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("echo hello"), vec!["echo", "hello"]);
        assert_eq!(
            split_command("/bin/bash -c \"curl -o a b\""),
            vec!["/bin/bash", "-c", "curl -o a b"]
        );
        assert!(split_command("   ").is_empty());
    }
}
