//! HS-013: CLI subcommands: compile, validate, profile, seal, rehearse, schema.

pub mod config;

use crate::connection::secret::{seal, SealingKey, Secret};
use crate::connection::test_connection;
use crate::core::compiler::compile_file;
use crate::core::record::save_record;
use crate::core::resolver::resolve;
use crate::core::types::Bundle;
use crate::orchestrator::api::StackAction;
use crate::orchestrator::runner::{run, BuildStatus, OutputValue, RunResult};
use crate::orchestrator::scripted::{Script, ScriptedApi};
use crate::orchestrator::trail::TrailRecord;
use clap::{Args, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a template and show its parameters and outputs
    Compile {
        /// Path to the HOT template
        #[arg(short, long)]
        file: PathBuf,

        /// Print the bundle record as JSON, hidden defaults masked
        #[arg(long)]
        json: bool,

        /// Save the bundle record to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve and validate parameter values against a template
    Validate {
        /// Path to the HOT template
        #[arg(short, long)]
        file: PathBuf,

        /// Parameter value (name=value), repeatable
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
    },

    /// Check the connection profile in a config file
    Profile {
        /// Path to hotstack.toml
        #[arg(short, long, default_value = "hotstack.toml")]
        config: PathBuf,

        /// Also run the connection check against a scripted service
        #[arg(long)]
        script: Option<PathBuf>,
    },

    /// Seal a secret read from stdin (passphrase from HOTSTACK_PASSPHRASE)
    Seal,

    /// Run a stack lifecycle against a scripted orchestration service
    Rehearse(RehearseArgs),

    /// Print the JSON Schema of a record format
    Schema {
        #[arg(value_enum, default_value = "bundle")]
        kind: SchemaKind,
    },
}

#[derive(Args, Debug)]
pub struct RehearseArgs {
    /// Path to the HOT template
    #[arg(short, long)]
    pub file: PathBuf,

    /// Scripted service behaviour (YAML)
    #[arg(short, long)]
    pub script: PathBuf,

    /// Lifecycle action
    #[arg(short, long, value_enum, default_value = "create")]
    pub action: StackAction,

    /// Stack name (default: template file stem)
    #[arg(long)]
    pub stack: Option<String>,

    /// Parameter value (name=value), repeatable
    #[arg(short = 'p', long = "param")]
    pub params: Vec<String>,

    /// Path to hotstack.toml
    #[arg(short, long, default_value = "hotstack.toml")]
    pub config: PathBuf,

    /// Override the poll interval (seconds, at least 1)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Override the timeout (seconds, 0 = none)
    #[arg(long)]
    pub timeout: Option<i64>,

    /// Print the run trail as JSON lines
    #[arg(long)]
    pub trail: bool,

    /// Print each trail record as it happens
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    Bundle,
    Profile,
    Config,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Compile { file, json, output } => {
            cmd_compile(&file, json, output.as_deref())
        }
        Commands::Validate { file, params } => cmd_validate(&file, &params),
        Commands::Profile { config, script } => {
            cmd_profile(&config, script.as_deref(), &sealing_key()?)
        }
        Commands::Seal => cmd_seal(&mut std::io::stdin().lock(), &sealing_key()?),
        Commands::Rehearse(args) => cmd_rehearse(&args, &sealing_key()?),
        Commands::Schema { kind } => cmd_schema(kind),
    }
}

fn sealing_key() -> Result<SealingKey, String> {
    SealingKey::from_env().map_err(|e| e.to_string())
}

/// Parse `name=value` assignments. Later assignments win.
pub fn parse_assignments(pairs: &[String]) -> Result<BTreeMap<String, String>, String> {
    let mut values = BTreeMap::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected name=value, got '{}'", pair))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing parameter name in '{}'", pair));
        }
        values.insert(name.to_string(), value.to_string());
    }
    Ok(values)
}

fn cmd_compile(file: &Path, json: bool, output: Option<&Path>) -> Result<(), String> {
    let bundle = compile_file(file).map_err(|e| e.to_string())?;

    if let Some(path) = output {
        save_record(path, &bundle).map_err(|e| e.to_string())?;
    }

    if json {
        println!("{}", bundle_json_view(&bundle)?);
    } else {
        print_bundle(&bundle);
    }
    Ok(())
}

/// Bundle record as JSON for the terminal. The saved record stays unmasked.
fn bundle_json_view(bundle: &Bundle) -> Result<String, String> {
    crate::core::record::bundle_to_json(&bundle.masked()).map_err(|e| e.to_string())
}

fn print_bundle(bundle: &Bundle) {
    println!(
        "{} ({} parameters, {} outputs)",
        bundle.name,
        bundle.parameters.len(),
        bundle.outputs.len()
    );
    println!("  fingerprint: {}", bundle.fingerprint);
    if let Some(tags) = &bundle.tags {
        println!("  tags: {}", tags);
    }
    for p in bundle.parameters.values() {
        let default = p
            .default
            .as_deref()
            .map(|d| format!(" = {}", p.display_value(d)))
            .unwrap_or_default();
        println!("  param {}: {}{}", p.name, p.value_type, default);
        for c in &p.constraints {
            println!("    {}: {}", c.kind(), c.description());
        }
    }
    for o in bundle.outputs.values() {
        match &o.description {
            Some(d) => println!("  output {}: {}", o.name, d),
            None => println!("  output {}", o.name),
        }
    }
}

fn cmd_validate(file: &Path, params: &[String]) -> Result<(), String> {
    let bundle = compile_file(file).map_err(|e| e.to_string())?;
    let supplied = parse_assignments(params)?;
    let resolved = resolve(&bundle, &supplied).map_err(|e| e.to_string())?;

    println!("OK: {} ({} parameters)", bundle.name, resolved.len());
    for (name, value) in resolved.masked() {
        println!("  {} = {}", name, value);
    }
    Ok(())
}

fn cmd_profile(config_path: &Path, script: Option<&Path>, key: &SealingKey) -> Result<(), String> {
    let config = config::load_config(config_path).map_err(|e| e.to_string())?;
    let profile = config.profile(key).map_err(|e| e.to_string())?;

    println!("project:  {}", profile.project);
    println!("url:      {}", profile.url);
    if profile.v3 {
        println!("domain:   {}", profile.domain);
    }
    println!("user:     {}", profile.user);
    println!("password: {}", profile.password);
    if !profile.region.is_empty() {
        println!("region:   {}", profile.region);
    }

    let missing = profile.missing_fields();
    if !missing.is_empty() {
        for field in &missing {
            eprintln!("  ERROR: {} must be filled in", field);
        }
        return Err(format!("{} missing field(s)", missing.len()));
    }
    profile.validate().map_err(|e| e.to_string())?;

    if let Some(script) = script {
        let api = ScriptedApi::new(Script::load(script)?);
        block_on(test_connection(&api, &profile))?.map_err(|e| e.to_string())?;
        println!("Connection OK");
    } else {
        println!("Profile OK");
    }
    Ok(())
}

fn cmd_seal(input: &mut dyn BufRead, key: &SealingKey) -> Result<(), String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .map_err(|e| format!("cannot read secret from stdin: {}", e))?;
    let secret = line.trim_end_matches(['\r', '\n']);
    if secret.is_empty() {
        return Err("no secret on stdin".to_string());
    }
    let sealed = seal(&Secret::new(secret), key).map_err(|e| e.to_string())?;
    println!("{}", sealed);
    Ok(())
}

fn cmd_rehearse(args: &RehearseArgs, key: &SealingKey) -> Result<(), String> {
    let bundle = compile_file(&args.file).map_err(|e| e.to_string())?;
    let supplied = parse_assignments(&args.params)?;
    let resolved = resolve(&bundle, &supplied).map_err(|e| e.to_string())?;
    let config = config::load_config(&args.config).map_err(|e| e.to_string())?;
    let profile = config.profile(key).map_err(|e| e.to_string())?;
    let api = ScriptedApi::new(Script::load(&args.script)?);

    let stack = args.stack.clone().unwrap_or_else(|| stack_name(&args.file));
    let mut options = config.run_options(&stack, args.action);
    let (progress, mut records) = tokio::sync::mpsc::unbounded_channel();
    if args.verbose {
        options = options.with_progress(progress);
    } else {
        drop(progress);
    }
    if let Some(secs) = args.interval {
        options = options.with_poll_interval_secs(secs);
    }
    if let Some(secs) = args.timeout {
        options = options.with_timeout_secs(secs);
    }

    println!("Rehearsing {} {} ({})", args.action, stack, bundle.name);
    let result = block_on(async move {
        let abort = CancellationToken::new();
        let on_interrupt = abort.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        let printer = tokio::spawn(async move {
            while let Some(record) = records.recv().await {
                println!("{}", progress_line(&record));
            }
        });
        let result = run(&api, &bundle, &profile, &resolved, &options, &abort).await;
        watcher.abort();
        // last sender; the printer drains and stops
        drop(options);
        let _ = printer.await;
        result
    })?
    .map_err(|e| e.to_string())?;

    print_result(&result);
    if args.trail {
        print!("{}", result.trail.to_jsonl());
    }
    match result.status {
        BuildStatus::Success => Ok(()),
        status => Err(format!("{}: {}", status, result.reason)),
    }
}

fn progress_line(record: &TrailRecord) -> String {
    format!("  [{}] {}", record.at.format("%H:%M:%S"), record.event)
}

fn print_result(result: &RunResult) {
    println!("{}: {} ({})", result.status, result.reason, result.state);
    for (name, value) in &result.outputs {
        match value {
            OutputValue::Resolved(v) => println!("  {} = {}", name, v),
            OutputValue::Missing => println!("  {} (missing)", name),
        }
    }
}

/// Stack name derived from the template file stem.
fn stack_name(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "stack".to_string())
}

fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, String> {
    let mut builder = tokio::runtime::Builder::new_current_thread();
    builder.enable_all();
    #[cfg(test)]
    builder.start_paused(true);
    let runtime = builder
        .build()
        .map_err(|e| format!("cannot start runtime: {}", e))?;
    Ok(runtime.block_on(future))
}

fn cmd_schema(kind: SchemaKind) -> Result<(), String> {
    let schema = match kind {
        SchemaKind::Bundle => schemars::schema_for!(Bundle),
        SchemaKind::Profile => {
            schemars::schema_for!(crate::connection::profile::ProfileRecord)
        }
        SchemaKind::Config => schemars::schema_for!(config::Config),
    };
    let json =
        serde_json::to_string_pretty(&schema).map_err(|e| format!("JSON error: {}", e))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::profile::tests::valid_profile;
    use crate::connection::profile::ProfileRecord;
    use crate::orchestrator::trail::{RunState, TrailEvent};
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    const TEMPLATE: &str = r#"
heat_template_version: 2016-10-14
parameters:
  flavor:
    type: string
    default: m1.small
    constraints:
      - allowed_values: [m1.small, m1.large]
  db_password:
    type: string
    hidden: true
outputs:
  instance_ip:
    description: IP of the server
tags: test
"#;

    const SCRIPT: &str = r#"
statuses:
  - status: create_in_progress
  - status: create_complete
outputs:
  instance_ip: 192.168.1.19
"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn write_config(dir: &Path, key: &SealingKey) -> PathBuf {
        let record = ProfileRecord::seal(&valid_profile(), key).unwrap();
        let config = config::Config {
            profile: record,
            run: config::RunSettings::default(),
        };
        write(dir, "hotstack.toml", &toml::to_string(&config).unwrap())
    }

    fn rehearse_args(dir: &Path, script: &str) -> RehearseArgs {
        RehearseArgs {
            file: write(dir, "server.yaml", TEMPLATE),
            script: write(dir, "script.yaml", script),
            action: StackAction::Create,
            stack: None,
            params: vec!["db_password=s3cret".to_string()],
            config: dir.join("hotstack.toml"),
            interval: None,
            timeout: None,
            trail: false,
            verbose: false,
        }
    }

    #[test]
    fn test_hs013_parse_assignments() {
        let values = parse_assignments(&[
            "flavor=m1.large".to_string(),
            "query=a=b".to_string(),
            "empty=".to_string(),
        ])
        .unwrap();
        assert_eq!(values["flavor"], "m1.large");
        assert_eq!(values["query"], "a=b");
        assert_eq!(values["empty"], "");
        assert!(parse_assignments(&["novalue".to_string()]).is_err());
        assert!(parse_assignments(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_hs013_compile() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "server.yaml", TEMPLATE);
        cmd_compile(&file, false, None).unwrap();
        cmd_compile(&file, true, None).unwrap();
    }

    #[test]
    fn test_hs013_compile_saves_record() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "server.yaml", TEMPLATE);
        let out = dir.path().join("out").join("server.json");
        cmd_compile(&file, false, Some(&out)).unwrap();
        let saved: Bundle = crate::core::record::load_record(&out).unwrap().unwrap();
        assert_eq!(saved.name, "server.yaml");
        assert!(saved.parameters["db_password"].hidden);
    }

    #[test]
    fn test_hs013_compile_json_masks_hidden_default() {
        let dir = tempfile::tempdir().unwrap();
        let template = TEMPLATE.replace("hidden: true", "hidden: true\n    default: hunter2");
        let file = write(dir.path(), "server.yaml", &template);
        let bundle = compile_file(&file).unwrap();

        let json = bundle_json_view(&bundle).unwrap();
        assert!(!json.contains("hunter2"), "{}", json);
        assert!(json.contains(crate::core::types::MASK));
        assert!(json.contains(&bundle.fingerprint));

        let out = dir.path().join("server.json");
        cmd_compile(&file, true, Some(&out)).unwrap();
        let saved: Bundle = crate::core::record::load_record(&out).unwrap().unwrap();
        assert_eq!(saved.parameters["db_password"].default.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_hs013_compile_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_compile(&dir.path().join("nope.yaml"), false, None).unwrap_err();
        assert!(err.contains("cannot read template"));
    }

    #[test]
    fn test_hs013_compile_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "bad.yaml", "parameters:\n  - a\n  - b\n");
        assert!(cmd_compile(&file, false, None).is_err());
    }

    #[test]
    fn test_hs013_validate() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "server.yaml", TEMPLATE);
        cmd_validate(&file, &["db_password=x".to_string()]).unwrap();

        let err = cmd_validate(
            &file,
            &["db_password=x".to_string(), "flavor=m1.huge".to_string()],
        )
        .unwrap_err();
        assert!(err.contains("allowed_values"));

        let err = cmd_validate(&file, &[]).unwrap_err();
        assert!(err.contains("db_password"));
    }

    #[test]
    fn test_hs013_profile() {
        let dir = tempfile::tempdir().unwrap();
        let key = SealingKey::from_passphrase("pass");
        let config = write_config(dir.path(), &key);
        cmd_profile(&config, None, &key).unwrap();

        let script = write(dir.path(), "ok.yaml", "statuses: []\n");
        cmd_profile(&config, Some(&script), &key).unwrap();

        let refused = write(dir.path(), "refused.yaml", "connection_error: bad token\n");
        let err = cmd_profile(&config, Some(&refused), &key).unwrap_err();
        assert!(err.contains("bad token"));
    }

    #[test]
    fn test_hs013_profile_wrong_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), &SealingKey::from_passphrase("pass"));
        assert!(cmd_profile(&config, None, &SealingKey::from_passphrase("nope")).is_err());
    }

    #[test]
    fn test_hs013_seal_reads_one_line() {
        let key = SealingKey::from_passphrase("pass");
        let mut input = std::io::Cursor::new(b"hunter2\n".to_vec());
        cmd_seal(&mut input, &key).unwrap();

        let mut empty = std::io::Cursor::new(b"\n".to_vec());
        assert!(cmd_seal(&mut empty, &key).is_err());
    }

    #[test]
    fn test_hs013_rehearse_success() {
        let dir = tempfile::tempdir().unwrap();
        let key = SealingKey::from_passphrase("pass");
        write_config(dir.path(), &key);
        let mut args = rehearse_args(dir.path(), SCRIPT);
        args.trail = true;
        cmd_rehearse(&args, &key).unwrap();
    }

    #[test]
    fn test_hs013_rehearse_verbose() {
        let dir = tempfile::tempdir().unwrap();
        let key = SealingKey::from_passphrase("pass");
        write_config(dir.path(), &key);
        let mut args = rehearse_args(dir.path(), SCRIPT);
        args.verbose = true;
        cmd_rehearse(&args, &key).unwrap();
    }

    #[test]
    fn test_hs013_progress_line() {
        let record = TrailRecord {
            at: chrono::DateTime::parse_from_rfc3339("2024-05-01T12:34:56Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
            event: TrailEvent::StateChanged {
                from: RunState::Submitting,
                to: RunState::InProgress,
                reason: "submitted".to_string(),
            },
        };
        assert_eq!(
            progress_line(&record),
            "  [12:34:56] SUBMITTING -> IN_PROGRESS: submitted"
        );
    }

    #[test]
    fn test_hs013_rehearse_interval_at_least_one() {
        let base = ["hotstack", "rehearse", "-f", "t.yaml", "-s", "s.yaml"];
        let zero = TestCli::try_parse_from(base.iter().copied().chain(["--interval", "0"]));
        assert!(zero.is_err());

        let cli = TestCli::try_parse_from(base.iter().copied().chain(["--interval", "2", "-v"]))
            .unwrap();
        match cli.command {
            Commands::Rehearse(args) => {
                assert_eq!(args.interval, Some(2));
                assert!(args.verbose);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_hs013_rehearse_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let key = SealingKey::from_passphrase("pass");
        write_config(dir.path(), &key);
        let args = rehearse_args(dir.path(), "statuses:\n  - status: CREATE_FAILED\n");
        let err = cmd_rehearse(&args, &key).unwrap_err();
        assert!(err.starts_with("FAILURE"));
    }

    #[test]
    fn test_hs013_rehearse_invalid_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let key = SealingKey::from_passphrase("pass");
        write_config(dir.path(), &key);
        let mut args = rehearse_args(dir.path(), SCRIPT);
        args.params.push("flavor=m1.huge".to_string());
        assert!(cmd_rehearse(&args, &key).is_err());
    }

    #[test]
    fn test_hs013_stack_name_from_file() {
        assert_eq!(stack_name(Path::new("templates/web-tier.yaml")), "web-tier");
    }

    #[test]
    fn test_hs013_schema() {
        cmd_schema(SchemaKind::Bundle).unwrap();
        cmd_schema(SchemaKind::Profile).unwrap();
        cmd_schema(SchemaKind::Config).unwrap();
    }
}
