//! Settings that decide which processes sessions run.

use log::warn;
use rusqlite::Connection;

use crate::settings;

/// Settings key for the shell used by shell tabs. Empty means `$SHELL`.
pub const SETTING_DEFAULT_SHELL: &str = "default_shell";

/// Settings key for the coding-agent executable.
pub const SETTING_AGENT_PROGRAM: &str = "agent_program";

/// Settings key for the extra agent arguments used in plan mode.
pub const SETTING_AGENT_PLAN_ARGS: &str = "agent_plan_args";

/// Settings key for extra environment, as `KEY=VALUE` pairs separated by `;`.
pub const SETTING_AGENT_ENV: &str = "agent_env";

/// Default agent executable if not configured.
pub const DEFAULT_AGENT_PROGRAM: &str = "claude";

/// Default plan-mode arguments if not configured.
pub const DEFAULT_AGENT_PLAN_ARGS: &str = "--permission-mode plan";

/// Seed default launch settings. Values the user already changed are kept.
pub fn seed_defaults(conn: &Connection) -> rusqlite::Result<()> {
    settings::set_default(conn, SETTING_DEFAULT_SHELL, "")?;
    settings::set_default(conn, SETTING_AGENT_PROGRAM, DEFAULT_AGENT_PROGRAM)?;
    settings::set_default(conn, SETTING_AGENT_PLAN_ARGS, DEFAULT_AGENT_PLAN_ARGS)?;
    settings::set_default(conn, SETTING_AGENT_ENV, "")?;
    Ok(())
}

/// Launch settings as stored, parsed into usable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub default_shell: Option<String>,
    pub agent_program: String,
    pub plan_args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            default_shell: None,
            agent_program: DEFAULT_AGENT_PROGRAM.to_string(),
            plan_args: split_args(DEFAULT_AGENT_PLAN_ARGS),
            env: Vec::new(),
        }
    }
}

/// Read launch settings, falling back to defaults for missing or blank values.
pub fn read_launch_settings(conn: &Connection) -> rusqlite::Result<LaunchSettings> {
    let defaults = LaunchSettings::default();
    let non_blank = |key: &str| -> rusqlite::Result<Option<String>> {
        Ok(settings::get(conn, key)?.filter(|v| !v.trim().is_empty()))
    };

    Ok(LaunchSettings {
        default_shell: non_blank(SETTING_DEFAULT_SHELL)?,
        agent_program: non_blank(SETTING_AGENT_PROGRAM)?.unwrap_or(defaults.agent_program),
        // Blank plan args are a valid choice: plan mode with no extra flags.
        plan_args: match settings::get(conn, SETTING_AGENT_PLAN_ARGS)? {
            Some(args) => split_args(&args),
            None => defaults.plan_args,
        },
        env: settings::get(conn, SETTING_AGENT_ENV)?
            .map(|env| parse_env(&env))
            .unwrap_or_default(),
    })
}

fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

/// Parse `KEY=VALUE;KEY2=VALUE2`. Malformed pairs are skipped.
pub fn parse_env(env: &str) -> Vec<(String, String)> {
    env.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Some((key.trim().to_string(), value.to_string()))
            }
            _ => {
                warn!("ignoring malformed {SETTING_AGENT_ENV} entry: {pair}");
                None
            }
        })
        .collect()
}
