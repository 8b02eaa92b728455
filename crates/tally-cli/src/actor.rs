//! Actor identity resolution for mutating commands.
//!
//! The resolution chain: `--actor` flag > `TALLY_ACTOR` env > `USER` env.
//! The resolved actor is recorded on every user change row.

use std::env;

/// Actor recorded when nothing else resolves.
pub const FALLBACK_ACTOR: &str = "unknown";

trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

fn resolve_actor_with(cli_flag: Option<&str>, env: &dyn EnvReader) -> String {
    if let Some(actor) = cli_flag.map(str::trim).filter(|a| !a.is_empty()) {
        return actor.to_string();
    }

    env.get("TALLY_ACTOR")
        .or_else(|| env.get("USER"))
        .unwrap_or_else(|| FALLBACK_ACTOR.to_string())
}

/// Resolve the actor for a user-mode write.
pub fn resolve_actor(cli_flag: Option<&str>) -> String {
    resolve_actor_with(cli_flag, &RealEnv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockEnv {
        vars: HashMap<String, String>,
    }

    impl MockEnv {
        fn var(mut self, key: &str, val: &str) -> Self {
            self.vars.insert(key.to_string(), val.to_string());
            self
        }
    }

    impl EnvReader for MockEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).filter(|v| !v.is_empty()).cloned()
        }
    }

    #[test]
    fn flag_wins() {
        let env = MockEnv::default().var("TALLY_ACTOR", "env-actor");
        assert_eq!(resolve_actor_with(Some("ayse"), &env), "ayse");
    }

    #[test]
    fn blank_flag_is_ignored() {
        let env = MockEnv::default().var("TALLY_ACTOR", "env-actor");
        assert_eq!(resolve_actor_with(Some("  "), &env), "env-actor");
    }

    #[test]
    fn tally_actor_beats_user() {
        let env = MockEnv::default()
            .var("TALLY_ACTOR", "env-actor")
            .var("USER", "login");
        assert_eq!(resolve_actor_with(None, &env), "env-actor");
    }

    #[test]
    fn user_then_fallback() {
        let env = MockEnv::default().var("USER", "login");
        assert_eq!(resolve_actor_with(None, &env), "login");
        assert_eq!(resolve_actor_with(None, &MockEnv::default()), FALLBACK_ACTOR);
    }
}
