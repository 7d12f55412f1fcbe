use std::io::Write;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, warn};

use crate::activate::{self, Activation, LinkState};
use crate::error::Error;
use crate::install::{self, InstallOutcome, NpmInstall};
use crate::model::{CurrentReport, EnvRow, LinkReport, LocalMarker, Source, StatusReport};
use crate::paths::{PathSet, expand};
use crate::pointer::{clear_global, read_global, write_global};
use crate::rename;
use crate::resolve::{self, Effective, Origin};
use crate::store;

pub const DEFAULT_ENV: &str = "default";

/// Per-invocation state shared by every subcommand.
pub struct Ctx<'a> {
    pub paths: PathSet,
    pub quiet: bool,
    pub out: &'a mut dyn Write,
}

impl Ctx<'_> {
    /// Data output (names, paths, JSON). Always printed.
    fn emit(&mut self, line: &str) -> anyhow::Result<()> {
        if let Err(e) = writeln!(self.out, "{line}") {
            // Common and harmless when piped to tools like `head`.
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e).context("write output");
            }
        }
        Ok(())
    }

    /// Status line about something that changed. Suppressed by `--quiet`.
    fn status(&mut self, line: &str) -> anyhow::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.emit(line)
    }

    fn emit_json<T: Serialize>(&mut self, value: &T) -> anyhow::Result<()> {
        let out = serde_json::to_string_pretty(value).context("serialize JSON output")?;
        self.emit(&out)
    }

    fn report_activation(&mut self, name: &str, outcome: &Activation) -> anyhow::Result<()> {
        if !outcome.changed() {
            debug!(env = name, "active link already up to date");
            return Ok(());
        }
        let link = self.paths.codex_home().display().to_string();
        let line = match outcome {
            Activation::Replaced { previous } => {
                format!("Relinked {link} -> {name} (was {})", previous.display())
            }
            _ => format!("Linked {link} -> {name}"),
        };
        self.status(&line)
    }

    fn activate(&mut self, name: &str) -> anyhow::Result<()> {
        let outcome = activate::activate(&self.paths, name)?;
        self.report_activation(name, &outcome)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InitArgs {
    pub name: Option<String>,
    pub npm_install: bool,
    pub npm_binary: Option<String>,
    pub npm_package: Option<String>,
    pub force_npm: bool,
}

/// Create (if needed), make global, and link an environment; optionally install codex first.
pub fn init(ctx: &mut Ctx<'_>, args: InitArgs) -> anyhow::Result<()> {
    let name = args.name.as_deref().unwrap_or(DEFAULT_ENV);
    store::validate_name(name)?;
    ctx.paths.ensure_dirs()?;

    if args.npm_install {
        let npm = NpmInstall::new(args.npm_binary.clone(), args.npm_package.clone());
        match npm.run(args.force_npm)? {
            InstallOutcome::AlreadyInstalled(path) => {
                ctx.status(&format!("codex already installed at {}", path.display()))?
            }
            InstallOutcome::Installed => ctx.status(&format!("Installed {}", npm.package))?,
        }
    }

    if !store::exists(&ctx.paths, name) {
        let dir = store::create(&ctx.paths, name)?;
        ctx.status(&format!("Created environment '{name}' at {}", dir.display()))?;
    }

    write_global(&ctx.paths, name)?;
    ctx.status(&format!("Global environment: {name}"))?;
    ctx.activate(name)
}

pub fn list(ctx: &mut Ctx<'_>, json: bool) -> anyhow::Result<()> {
    let global = read_global(&ctx.paths)?;
    let active = activate::active_env(&ctx.paths)?;
    let local = resolve::resolve_local(ctx.paths.cwd())?.map(|l| l.name);

    let rows: Vec<EnvRow> = store::list(&ctx.paths)?
        .into_iter()
        .map(|name| EnvRow {
            path: ctx.paths.env_path(&name).display().to_string(),
            global: global.as_deref() == Some(name.as_str()),
            active: active.as_deref() == Some(name.as_str()),
            local: local.as_deref() == Some(name.as_str()),
            name,
        })
        .collect();

    if json {
        return ctx.emit_json(&rows);
    }

    for row in &rows {
        let mut tags = Vec::new();
        if row.global {
            tags.push("global");
        }
        if row.local {
            tags.push("local");
        }
        if row.active {
            tags.push("active");
        }
        let mark = if row.active { '*' } else { ' ' };
        if tags.is_empty() {
            ctx.emit(&format!("{mark} {}", row.name))?;
        } else {
            ctx.emit(&format!("{mark} {} ({})", row.name, tags.join(", ")))?;
        }
    }
    Ok(())
}

pub fn create(ctx: &mut Ctx<'_>, name: &str, activate_it: bool) -> anyhow::Result<()> {
    let dir = store::create(&ctx.paths, name)?;
    ctx.status(&format!("Created environment '{name}' at {}", dir.display()))?;
    if activate_it {
        write_global(&ctx.paths, name)?;
        ctx.status(&format!("Global environment: {name}"))?;
        ctx.activate(name)?;
    }
    Ok(())
}

pub fn delete(ctx: &mut Ctx<'_>, name: &str, force: bool) -> anyhow::Result<()> {
    store::require(&ctx.paths, name)?;
    let is_global = read_global(&ctx.paths)?.as_deref() == Some(name);
    let is_active = activate::active_env(&ctx.paths)?.as_deref() == Some(name);

    let reason = match (is_global, is_active) {
        (true, true) => Some("the global default and the active link target"),
        (true, false) => Some("the global default"),
        (false, true) => Some("the active link target"),
        (false, false) => None,
    };
    if let (Some(reason), false) = (reason, force) {
        return Err(Error::EnvironmentInUse {
            name: name.to_string(),
            reason,
        }
        .into());
    }

    if is_active {
        activate::deactivate(&ctx.paths)?;
        ctx.status(&format!("Removed link {}", ctx.paths.codex_home().display()))?;
    }
    if is_global {
        clear_global(&ctx.paths)?;
        ctx.status("Cleared global environment")?;
    }
    let stale_local = resolve::resolve_local(ctx.paths.cwd())?.filter(|l| l.name == name);
    if let Some(local) = stale_local {
        warn!(marker = %local.marker.display(), "local marker still names '{name}'");
    }

    store::delete(&ctx.paths, name)?;
    ctx.status(&format!("Deleted environment '{name}'"))
}

pub fn rename(ctx: &mut Ctx<'_>, old: &str, new: &str) -> anyhow::Result<()> {
    let renamed = rename::rename(&ctx.paths, old, new)?;
    ctx.status(&format!("Renamed environment '{old}' -> '{new}'"))?;
    if renamed.global_updated {
        ctx.status(&format!("Global environment: {new}"))?;
    }
    if let Some(outcome) = &renamed.relinked {
        ctx.report_activation(new, outcome)?;
    }
    Ok(())
}

pub fn global(ctx: &mut Ctx<'_>, name: Option<&str>, unset: bool) -> anyhow::Result<()> {
    if unset {
        if clear_global(&ctx.paths)? {
            ctx.status("Cleared global environment")?;
        }
        return Ok(());
    }

    match name {
        Some(name) => {
            store::validate_name(name)?;
            store::require(&ctx.paths, name)?;
            write_global(&ctx.paths, name)?;
            ctx.status(&format!("Global environment: {name}"))?;
            ctx.activate(name)
        }
        None => match read_global(&ctx.paths)? {
            Some(g) => ctx.emit(&g),
            None => {
                debug!("no global environment set");
                Ok(())
            }
        },
    }
}

/// Show, set or remove the local marker. `dir` defaults to the working directory.
pub fn local(
    ctx: &mut Ctx<'_>,
    name: Option<&str>,
    unset: bool,
    dir: Option<&str>,
) -> anyhow::Result<()> {
    let dir = match dir {
        Some(d) => expand(d)?,
        None => ctx.paths.cwd().to_path_buf(),
    };

    if unset {
        if resolve::remove_local(&dir)? {
            ctx.status(&format!("Removed local marker in {}", dir.display()))?;
        } else {
            debug!(dir = %dir.display(), "no local marker to remove");
        }
        return Ok(());
    }

    match name {
        Some(name) => {
            store::validate_name(name)?;
            store::require(&ctx.paths, name)?;
            let marker = resolve::write_local(&dir, name)?;
            ctx.status(&format!("Local environment: {name} ({})", marker.display()))?;
            ctx.activate(name)
        }
        None => match resolve::resolve_local(&dir)? {
            Some(l) => ctx.emit(&format!("{} ({})", l.name, l.marker.display())),
            None => {
                debug!("no local marker found");
                Ok(())
            }
        },
    }
}

fn current_report(paths: &PathSet, eff: &Effective) -> CurrentReport {
    let (source, origin) = match &eff.origin {
        Origin::Local(p) => (Source::Local, p),
        Origin::Global(p) => (Source::Global, p),
    };
    CurrentReport {
        name: eff.name.clone(),
        source,
        origin: origin.display().to_string(),
        exists: store::exists(paths, &eff.name),
    }
}

fn require_effective(paths: &PathSet) -> anyhow::Result<Effective> {
    match resolve::effective(paths)? {
        Some(eff) => Ok(eff),
        None => Err(Error::NoEffectiveEnvironment.into()),
    }
}

pub fn current(ctx: &mut Ctx<'_>, json: bool) -> anyhow::Result<()> {
    let eff = require_effective(&ctx.paths)?;
    let report = current_report(&ctx.paths, &eff);
    if !report.exists {
        warn!(env = %report.name, "effective environment does not exist");
    }

    if json {
        return ctx.emit_json(&report);
    }
    let source = match report.source {
        Source::Local => "local",
        Source::Global => "global",
    };
    ctx.emit(&format!("{} ({source}: {})", report.name, report.origin))
}

/// Point the active link at the effective environment.
pub fn sync(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    let eff = require_effective(&ctx.paths)?;
    ctx.activate(&eff.name)
}

pub fn path(ctx: &mut Ctx<'_>, name: Option<&str>) -> anyhow::Result<()> {
    let name = match name {
        Some(n) => n.to_string(),
        None => require_effective(&ctx.paths)?.name,
    };
    let dir = store::require(&ctx.paths, &name)?;
    ctx.emit(&dir.display().to_string())
}

pub fn status(ctx: &mut Ctx<'_>, json: bool) -> anyhow::Result<()> {
    let paths = &ctx.paths;
    let link = match activate::inspect(paths.codex_home())? {
        LinkState::Missing => LinkReport::Missing,
        LinkState::RealDirectory => LinkReport::RealDirectory,
        LinkState::OtherEntry => LinkReport::OtherEntry,
        LinkState::Symlink(target) => LinkReport::Symlink {
            target: target.display().to_string(),
            env: activate::active_env(paths)?,
        },
    };

    let report = StatusReport {
        root: paths.root().display().to_string(),
        envs_dir: paths.envs_dir().display().to_string(),
        codex_home: paths.codex_home().display().to_string(),
        cwd: paths.cwd().display().to_string(),
        envs: store::list(paths)?,
        global: read_global(paths)?,
        local: resolve::resolve_local(paths.cwd())?.map(|l| LocalMarker {
            name: l.name,
            marker: l.marker.display().to_string(),
        }),
        effective: resolve::effective(paths)?.map(|e| current_report(paths, &e)),
        link,
        codex_binary: install::which(install::TOOL_BINARY).map(|p| p.display().to_string()),
    };

    if json {
        return ctx.emit_json(&report);
    }

    let link_line = match &report.link {
        LinkReport::Missing => "missing".to_string(),
        LinkReport::RealDirectory => "real directory (not managed)".to_string(),
        LinkReport::OtherEntry => "not a directory or symlink".to_string(),
        LinkReport::Symlink {
            target,
            env: Some(env),
        } => format!("-> {env} ({target})"),
        LinkReport::Symlink { target, env: None } => {
            format!("-> {target} (not a managed environment)")
        }
    };
    let lines = [
        format!("root:       {}", report.root),
        format!("codex home: {} {link_line}", report.codex_home),
        format!("envs:       {}", report.envs.join(", ")),
        format!("global:     {}", report.global.as_deref().unwrap_or("(none)")),
        format!(
            "local:      {}",
            report
                .local
                .as_ref()
                .map(|l| format!("{} ({})", l.name, l.marker))
                .unwrap_or_else(|| "(none)".to_string())
        ),
        format!(
            "effective:  {}",
            report
                .effective
                .as_ref()
                .map(|e| if e.exists {
                    e.name.clone()
                } else {
                    format!("{} (missing)", e.name)
                })
                .unwrap_or_else(|| "(none)".to_string())
        ),
        format!(
            "codex:      {}",
            report.codex_binary.as_deref().unwrap_or("not installed")
        ),
    ];
    for line in lines {
        ctx.emit(&line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::exit_code;
    use crate::testing::Sandbox;

    fn ctx<'a>(sb: &Sandbox, out: &'a mut Vec<u8>, quiet: bool) -> Ctx<'a> {
        Ctx {
            paths: sb.paths.clone(),
            quiet,
            out,
        }
    }

    fn text(out: &[u8]) -> String {
        String::from_utf8_lossy(out).into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn init_with_custom_name_sets_global_and_links() {
        let sb = Sandbox::new();
        let mut out = Vec::new();
        let args = InitArgs {
            name: Some("myenv".into()),
            ..InitArgs::default()
        };
        init(&mut ctx(&sb, &mut out, false), args).expect("init");

        assert_eq!(read_global(&sb.paths).expect("read").as_deref(), Some("myenv"));
        assert!(sb.paths.env_path("myenv").is_dir());
        assert!(activate::symlink_points_to(
            sb.paths.codex_home(),
            &sb.paths.env_path("myenv")
        ));
        let printed = text(&out);
        assert!(printed.contains("Created environment 'myenv'"));
        assert!(printed.contains("Linked"));
    }

    #[cfg(unix)]
    #[test]
    fn init_defaults_name_and_is_repeatable() {
        let sb = Sandbox::new();
        let mut out = Vec::new();
        init(&mut ctx(&sb, &mut out, true), InitArgs::default()).expect("first");
        init(&mut ctx(&sb, &mut out, true), InitArgs::default()).expect("second");
        assert!(out.is_empty());
        assert_eq!(read_global(&sb.paths).expect("read").as_deref(), Some(DEFAULT_ENV));
        assert_eq!(store::list(&sb.paths).expect("list"), vec![DEFAULT_ENV]);
    }

    #[test]
    fn init_refuses_real_codex_home() {
        let sb = Sandbox::new();
        std::fs::create_dir_all(sb.paths.codex_home()).expect("mkdir");
        let mut out = Vec::new();
        let err = init(&mut ctx(&sb, &mut out, true), InitArgs::default()).unwrap_err();
        assert_eq!(exit_code(&err), 3);
        assert!(sb.paths.codex_home().is_dir());
    }

    #[test]
    fn init_missing_npm_exits_127() {
        let sb = Sandbox::new();
        let mut out = Vec::new();
        let args = InitArgs {
            npm_install: true,
            npm_binary: Some("npm-missing-codexenv".into()),
            force_npm: true,
            ..InitArgs::default()
        };
        let err = init(&mut ctx(&sb, &mut out, true), args).unwrap_err();
        assert_eq!(exit_code(&err), 127);
        assert!(!sb.paths.env_path(DEFAULT_ENV).exists());
    }

    #[test]
    fn rename_exit_codes() {
        let sb = Sandbox::new();
        sb.paths.ensure_dirs().expect("ensure");
        let mut out = Vec::new();

        let err = rename(&mut ctx(&sb, &mut out, true), "missing", "new").unwrap_err();
        assert_eq!(exit_code(&err), 2);

        sb.mkenv("one");
        sb.mkenv("two");
        let err = rename(&mut ctx(&sb, &mut out, true), "one", "two").unwrap_err();
        assert_eq!(exit_code(&err), 4);
    }

    #[cfg(unix)]
    #[test]
    fn list_marks_global_local_and_active() {
        let sb = Sandbox::new();
        sb.mkenv("a");
        sb.mkenv("b");
        sb.mkenv("c");
        write_global(&sb.paths, "a").expect("global");
        resolve::write_local(sb.paths.cwd(), "b").expect("local");
        activate::activate(&sb.paths, "c").expect("activate");

        let mut out = Vec::new();
        list(&mut ctx(&sb, &mut out, false), false).expect("list");
        assert_eq!(text(&out), "  a (global)\n  b (local)\n* c (active)\n");

        let mut out = Vec::new();
        list(&mut ctx(&sb, &mut out, false), true).expect("list json");
        let rows: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(rows[0]["name"], "a");
        assert_eq!(rows[0]["global"], true);
        assert_eq!(rows[2]["active"], true);
    }

    #[cfg(unix)]
    #[test]
    fn delete_refuses_in_use_without_force() {
        let sb = Sandbox::new();
        let mut out = Vec::new();
        init(&mut ctx(&sb, &mut out, true), InitArgs::default()).expect("init");

        let err = delete(&mut ctx(&sb, &mut out, true), DEFAULT_ENV, false).unwrap_err();
        assert_eq!(exit_code(&err), 6);
        assert!(sb.paths.env_path(DEFAULT_ENV).is_dir());

        delete(&mut ctx(&sb, &mut out, true), DEFAULT_ENV, true).expect("forced delete");
        assert!(!sb.paths.env_path(DEFAULT_ENV).exists());
        assert_eq!(read_global(&sb.paths).expect("read"), None);
        assert_eq!(
            activate::inspect(sb.paths.codex_home()).expect("inspect"),
            LinkState::Missing
        );
    }

    #[test]
    fn delete_unreferenced_env() {
        let sb = Sandbox::new();
        sb.mkenv("spare");
        let mut out = Vec::new();
        delete(&mut ctx(&sb, &mut out, false), "spare", false).expect("delete");
        assert!(!sb.paths.env_path("spare").exists());
        assert!(text(&out).contains("Deleted environment 'spare'"));
    }

    #[test]
    fn current_reports_source_or_exits_7() {
        let sb = Sandbox::new();
        let mut out = Vec::new();
        let err = current(&mut ctx(&sb, &mut out, false), false).unwrap_err();
        assert_eq!(exit_code(&err), 7);

        write_global(&sb.paths, "g1").expect("global");
        current(&mut ctx(&sb, &mut out, false), false).expect("current");
        assert!(text(&out).starts_with("g1 (global: "));

        let mut out = Vec::new();
        resolve::write_local(sb.paths.cwd(), "l1").expect("local");
        current(&mut ctx(&sb, &mut out, false), true).expect("current json");
        let v: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(v["name"], "l1");
        assert_eq!(v["source"], "local");
        assert_eq!(v["exists"], false);
    }

    #[cfg(unix)]
    #[test]
    fn sync_links_effective_env() {
        let sb = Sandbox::new();
        let env = sb.mkenv("proj");
        write_global(&sb.paths, "other").expect("global");
        resolve::write_local(sb.paths.cwd(), "proj").expect("local");

        let mut out = Vec::new();
        sync(&mut ctx(&sb, &mut out, false)).expect("sync");
        assert!(activate::symlink_points_to(sb.paths.codex_home(), &env));

        let mut again = Vec::new();
        sync(&mut ctx(&sb, &mut again, false)).expect("sync again");
        assert!(again.is_empty());
    }

    #[test]
    fn sync_missing_effective_env_exits_2() {
        let sb = Sandbox::new();
        write_global(&sb.paths, "ghost").expect("global");
        let mut out = Vec::new();
        let err = sync(&mut ctx(&sb, &mut out, false)).unwrap_err();
        assert_eq!(exit_code(&err), 2);
    }

    #[cfg(unix)]
    #[test]
    fn global_and_local_setters_require_existing_env() {
        let sb = Sandbox::new();
        let mut out = Vec::new();
        let err = global(&mut ctx(&sb, &mut out, true), Some("nope"), false).unwrap_err();
        assert_eq!(exit_code(&err), 2);
        let err = local(&mut ctx(&sb, &mut out, true), Some("nope"), false, None).unwrap_err();
        assert_eq!(exit_code(&err), 2);
        assert!(!sb.paths.cwd().join(resolve::LOCAL_MARKER).exists());

        sb.mkenv("yes");
        local(&mut ctx(&sb, &mut out, true), Some("yes"), false, None).expect("local");
        assert_eq!(
            resolve::resolve_local(sb.paths.cwd())
                .expect("resolve")
                .map(|l| l.name)
                .as_deref(),
            Some("yes")
        );
        local(&mut ctx(&sb, &mut out, true), None, true, None).expect("unset");
        assert_eq!(resolve::resolve_local(sb.paths.cwd()).expect("resolve"), None);
    }

    #[test]
    fn path_prints_env_dir() {
        let sb = Sandbox::new();
        let env = sb.mkenv("p");
        let mut out = Vec::new();
        path(&mut ctx(&sb, &mut out, true), Some("p")).expect("path");
        assert_eq!(text(&out).trim_end(), env.display().to_string());
    }

    #[test]
    fn path_and_delete_reject_traversal_names() {
        let sb = Sandbox::new();
        let keep = sb.mkenv("keep");
        write_global(&sb.paths, "keep").expect("global");
        let mut out = Vec::new();

        let err = path(&mut ctx(&sb, &mut out, true), Some("..")).unwrap_err();
        assert_eq!(exit_code(&err), 5);
        let err = delete(&mut ctx(&sb, &mut out, true), "..", true).unwrap_err();
        assert_eq!(exit_code(&err), 5);

        assert!(out.is_empty());
        assert!(keep.is_dir());
        assert_eq!(read_global(&sb.paths).expect("read").as_deref(), Some("keep"));
    }

    #[test]
    fn status_json_describes_link_state() {
        let sb = Sandbox::new();
        std::fs::create_dir_all(sb.paths.codex_home()).expect("mkdir");
        let mut out = Vec::new();
        status(&mut ctx(&sb, &mut out, false), true).expect("status");
        let v: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(v["link"]["state"], "real_directory");
        assert!(v["global"].is_null());
    }
}
