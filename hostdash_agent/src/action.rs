//! Control actions and their per-scope allow-lists.

use std::fmt;

use crate::error::AdapterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Pm2,
    Docker,
    Os,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Pm2 => "pm2",
            Scope::Docker => "docker",
            Scope::Os => "process",
        }
    }

    fn allowed(self) -> &'static [Action] {
        match self {
            Scope::Pm2 => &[Action::Restart, Action::Stop, Action::Delete, Action::Start],
            Scope::Docker => &[Action::Restart, Action::Stop, Action::Remove],
            Scope::Os => &[Action::Kill, Action::ForceKill],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Restart,
    Stop,
    Start,
    Delete,
    Remove,
    Kill,
    ForceKill,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Restart => "restart",
            Action::Stop => "stop",
            Action::Start => "start",
            Action::Delete => "delete",
            Action::Remove => "remove",
            Action::Kill => "kill",
            Action::ForceKill => "forceKill",
        }
    }

    /// Parse `raw` for `scope`. Anything outside the scope's allow-list is
    /// rejected here, before any adapter gets to run a command.
    pub fn parse(scope: Scope, raw: &str) -> Result<Action, AdapterError> {
        scope
            .allowed()
            .iter()
            .copied()
            .find(|a| a.as_str() == raw)
            .ok_or_else(|| AdapterError::InvalidAction {
                scope: scope.as_str(),
                action: raw.to_string(),
            })
    }
}

/// Check a PM2 id/name or container id/name before it lands in argv or an
/// engine URL. A leading '-' would be read as a CLI option.
pub fn validate_target(scope: Scope, id: &str) -> Result<(), AdapterError> {
    let bad = |why: &str| -> Result<(), AdapterError> {
        Err(AdapterError::BadRequest(format!(
            "{} target '{id}': {why}",
            scope.as_str()
        )))
    };
    if id.is_empty() {
        return bad("empty");
    }
    if id.starts_with('-') {
        return bad("must not start with '-'");
    }
    if id.chars().any(char::is_control) {
        return bad("control characters");
    }
    // container ids and names are [a-zA-Z0-9][a-zA-Z0-9_.-]*
    if scope == Scope::Docker
        && !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return bad("not a container id or name");
    }
    Ok(())
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pm2_allow_list() {
        for a in ["restart", "stop", "delete", "start"] {
            assert!(Action::parse(Scope::Pm2, a).is_ok(), "{a}");
        }
        assert!(Action::parse(Scope::Pm2, "remove").is_err());
        assert!(Action::parse(Scope::Pm2, "kill").is_err());
    }

    #[test]
    fn docker_allow_list() {
        assert_eq!(Action::parse(Scope::Docker, "remove").unwrap(), Action::Remove);
        assert!(Action::parse(Scope::Docker, "start").is_err());
        assert!(Action::parse(Scope::Docker, "delete").is_err());
    }

    #[test]
    fn os_allow_list_is_case_sensitive() {
        assert_eq!(Action::parse(Scope::Os, "forceKill").unwrap(), Action::ForceKill);
        assert!(Action::parse(Scope::Os, "forcekill").is_err());
        assert!(Action::parse(Scope::Os, "restart").is_err());
    }

    #[test]
    fn rejection_names_scope_and_action() {
        let err = Action::parse(Scope::Docker, "rm -rf /").unwrap_err();
        assert_eq!(err.to_string(), "invalid action 'rm -rf /' for docker");
    }

    #[test]
    fn option_like_targets_are_rejected() {
        for scope in [Scope::Pm2, Scope::Docker] {
            assert!(matches!(
                validate_target(scope, "-f"),
                Err(AdapterError::BadRequest(_))
            ));
            assert!(validate_target(scope, "").is_err());
        }
        assert!(validate_target(Scope::Docker, "../images").is_err());
        assert!(validate_target(Scope::Docker, "web_1.blue-2").is_ok());
        assert!(validate_target(Scope::Pm2, "api server").is_ok());
        assert!(validate_target(Scope::Pm2, "0").is_ok());
    }
}
