//! Command lines for shells and coding agents.

use std::path::Path;

use portable_pty::CommandBuilder;
use switchyard_mux::{AgentLaunch, AgentMode};

pub const DEFAULT_AGENT_PROGRAM: &str = "claude";
pub const DEFAULT_PLAN_ARGS: &[&str] = &["--permission-mode", "plan"];

/// How the backend builds the processes it spawns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyConfig {
    /// Shell for shell sessions. `None` uses `$SHELL`, then `/bin/sh`.
    pub shell: Option<String>,
    /// Agent executable, resolved through `PATH`.
    pub agent_program: String,
    /// Extra arguments for agents started in plan mode.
    pub plan_args: Vec<String>,
    /// Added to every child's environment.
    pub env: Vec<(String, String)>,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            shell: None,
            agent_program: DEFAULT_AGENT_PROGRAM.to_string(),
            plan_args: DEFAULT_PLAN_ARGS.iter().map(|s| s.to_string()).collect(),
            env: Vec::new(),
        }
    }
}

impl PtyConfig {
    pub fn shell_command(&self, working_dir: &Path) -> CommandBuilder {
        let shell = self.shell.clone().unwrap_or_else(default_shell);
        let mut cmd = CommandBuilder::new(shell);
        cmd.cwd(working_dir);
        self.apply_env(&mut cmd);
        cmd
    }

    pub fn agent_command(&self, launch: &AgentLaunch) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.agent_program);
        cmd.cwd(&launch.worktree_path);
        if launch.mode == AgentMode::Plan {
            cmd.args(&self.plan_args);
        }
        self.apply_env(&mut cmd);
        cmd
    }

    fn apply_env(&self, cmd: &mut CommandBuilder) {
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
    }
}

/// Returns the user's default shell, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;
    use std::path::PathBuf;

    use super::*;

    fn argv(cmd: &CommandBuilder) -> Vec<String> {
        cmd.get_argv()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn launch(mode: AgentMode) -> AgentLaunch {
        AgentLaunch {
            worktree_path: PathBuf::from("/wt/issue-5"),
            issue_context: String::new(),
            mode,
        }
    }

    #[test]
    fn test_plan_mode_appends_plan_args() {
        let config = PtyConfig::default();
        let cmd = config.agent_command(&launch(AgentMode::Plan));

        assert_eq!(argv(&cmd), vec!["claude", "--permission-mode", "plan"]);
        assert_eq!(cmd.get_cwd().map(|p| p.as_os_str()), Some(OsStr::new("/wt/issue-5")));
    }

    #[test]
    fn test_act_mode_has_no_extra_args() {
        let config = PtyConfig {
            agent_program: "my-agent".to_string(),
            ..PtyConfig::default()
        };
        let cmd = config.agent_command(&launch(AgentMode::Act));
        assert_eq!(argv(&cmd), vec!["my-agent"]);
    }

    #[test]
    fn test_shell_command_env() {
        let config = PtyConfig {
            shell: Some("/bin/sh".to_string()),
            env: vec![("SWITCHYARD".to_string(), "1".to_string())],
            ..PtyConfig::default()
        };
        let cmd = config.shell_command(Path::new("/repo"));

        assert_eq!(argv(&cmd), vec!["/bin/sh"]);
        assert_eq!(cmd.get_env("TERM"), Some(OsStr::new("xterm-256color")));
        assert_eq!(cmd.get_env("COLORTERM"), Some(OsStr::new("truecolor")));
        assert_eq!(cmd.get_env("SWITCHYARD"), Some(OsStr::new("1")));
    }

    #[test]
    fn test_default_shell_detection() {
        let shell = default_shell();
        assert!(!shell.is_empty(), "Default shell should not be empty");
        assert!(
            shell.starts_with('/'),
            "Default shell should be an absolute path, got: {shell}"
        );
    }
}
