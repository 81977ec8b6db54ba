//!
//! rbacstore command-line driver
//! -----------------------------
//! One-shot (`-q`), stdin script, or interactive line mode over a store rooted at a
//! directory. The store loads `<root>/rbac.snapshot` at start when present.

pub mod outputformatter;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::error::RbacError;
use crate::exec;
use crate::rbac::Rbac;

pub const DEFAULT_ROOT: &str = "rbac_data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub root: PathBuf,
    pub query: Option<String>,
    pub repl: bool,
    pub json: bool,
    pub help: bool,
}

pub fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} -q \"<command>\" [--root <dir>] [--json]\n  {program} [--root <dir>]          # reads commands from stdin, one per line\n  {program} --repl [--root <dir>]   # interactive mode\n\nFlags:\n  --root <dir>        Store directory (default: $RBAC_ROOT or ./{DEFAULT_ROOT})\n  -q, --query <cmd>   Run a single command\n  --repl              Start interactive mode\n  --json              Always print JSON, never tables\n  -h, --help          Show this help\n\nCommands:\n  ROLE|PERMISSION ADD <title> [DESCRIPTION '<text>'] [UNDER <ref>]\n  ROLE|PERMISSION ADD PATH /a/b/c [DESCRIPTIONS '<d1>','<d2>',...]\n  ROLE|PERMISSION REMOVE <ref> [RECURSIVE]\n  ROLE|PERMISSION EDIT <ref> TITLE <title> [DESCRIPTION '<text>']\n  ROLE|PERMISSION SHOW|CHILDREN|PATH <ref>\n  ROLE|PERMISSION DESCENDANTS <ref> [ABSOLUTE]\n  ROLE|PERMISSION COUNT\n  ASSIGN <role> TO <permission>        UNASSIGN <role> FROM <permission>\n  GRANT <role> TO SUBJECT <s> [CONSTRAINT '<text>']   REVOKE <role> FROM SUBJECT <s>\n  CHECK|EXPLAIN <permission> FOR <s>\n  ROLES FOR <s> [UNDER <role>]         PERMISSIONS OF <role>\n  RESET [ROLES|PERMISSIONS|ASSIGNMENTS|ALL] CONFIRM\n  SAVE | LOAD\n\nReferences: #<id>, /path/to/node, or a title.\nInteractive: help, quit | exit"
    );
}

pub fn parse_args<I>(args: I, env_root: Option<String>) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut opts = CliOptions {
        root: PathBuf::from(env_root.unwrap_or_else(|| DEFAULT_ROOT.to_string())),
        query: None,
        repl: false,
        json: false,
        help: false,
    };
    let mut it = args.into_iter();
    while let Some(a) = it.next() {
        match a.as_str() {
            "--root" => opts.root = PathBuf::from(it.next().ok_or_else(|| anyhow!("--root requires a directory"))?),
            "-q" | "--query" => opts.query = Some(it.next().ok_or_else(|| anyhow!("{} requires a command", a))?),
            "--repl" => opts.repl = true,
            "--json" => opts.json = true,
            "-h" | "--help" => opts.help = true,
            other => return Err(anyhow!("unknown argument '{}'", other)),
        }
    }
    if opts.repl && opts.query.is_some() {
        return Err(anyhow!("--repl and --query are mutually exclusive"));
    }
    Ok(opts)
}

/// Pretty JSON, or a table for list results unless `json` is forced.
pub fn render(val: &Value, json: bool) -> String {
    if !json {
        if let Some(t) = outputformatter::render_table(val) { return t; }
    }
    serde_json::to_string_pretty(val).unwrap_or_else(|_| val.to_string())
}

fn run_line(rbac: &Rbac, line: &str, json: bool) -> std::result::Result<String, RbacError> {
    exec::execute_text(rbac, line).map(|v| render(&v, json))
}

fn is_comment(line: &str) -> bool { line.starts_with("--") || line.starts_with('#') }

/// Execute newline-separated commands, stopping at the first failure.
pub fn run_script<R: BufRead, W: Write>(rbac: &Rbac, input: R, out: &mut W, json: bool) -> Result<i32> {
    for (n, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || is_comment(line) { continue; }
        match run_line(rbac, line, json) {
            Ok(text) => writeln!(out, "{}", text)?,
            Err(e) => {
                eprintln!("error: line {}: {}", n + 1, e);
                return Ok(e.exit_code());
            }
        }
    }
    Ok(0)
}

fn run_repl(rbac: &Rbac, json: bool) -> Result<i32> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input = String::new();
    println!("rbacstore interpreter. Type 'help' for commands.");
    loop {
        input.clear();
        print!("> ");
        let _ = stdout.flush();
        if stdin.read_line(&mut input)? == 0 { break; }
        let line = input.trim();
        if line.is_empty() { continue; }
        let up = line.to_uppercase();
        if up == "EXIT" || up == "QUIT" { break; }
        if up == "HELP" { print_usage("rbacstore"); continue; }
        match run_line(rbac, line, json) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(0)
}

/// Entry point shared by the binary. Returns the process exit code.
pub fn run(args: Vec<String>) -> Result<i32> {
    let program = args.first().cloned().unwrap_or_else(|| "rbacstore".to_string());
    let opts = match parse_args(args.into_iter().skip(1), std::env::var("RBAC_ROOT").ok()) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{}", e);
            print_usage(&program);
            return Ok(2);
        }
    };
    if opts.help {
        print_usage(&program);
        return Ok(0);
    }
    let rbac = Rbac::open(&opts.root).with_context(|| format!("opening store at {}", opts.root.display()))?;
    if let Some(q) = &opts.query {
        return match run_line(&rbac, q, opts.json) {
            Ok(text) => {
                println!("{}", text);
                Ok(0)
            }
            Err(e) => {
                eprintln!("error: {}", e);
                Ok(e.exit_code())
            }
        };
    }
    if opts.repl {
        return run_repl(&rbac, opts.json);
    }
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_script(&rbac, stdin.lock(), &mut stdout, opts.json)
}
