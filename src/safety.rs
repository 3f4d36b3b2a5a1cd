//! Safety gate for synthesized commands.
//!
//! Every candidate command passes two layers before it may run:
//!
//! 1. A deterministic pattern layer. It splits the command line into simple
//!    commands (across `;`, `&&`, `|`, subshells, `sh -c` and `eval` strings,
//!    text echoed into a shell and `find -exec` actions), looks through
//!    wrappers such as `sudo`, `env` and `xargs` along with their options,
//!    and matches the result against known-destructive forms. A blocked match
//!    is final and never consults a provider.
//! 2. An optional semantic layer that asks a provider for a judgment on
//!    commands the pattern layer left alone. A failed call yields
//!    `NeedsConfirmation`, never `Safe`.

use crate::plan::{SafetyLevel, SafetyVerdict};
use crate::providers::{
    Judgment, ProviderChain, ProviderRequest, RequestRole, ResponsePayload,
};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

// Blocked rule ids.
pub const RECURSIVE_FORCE_DELETE: &str = "recursive-force-delete";
pub const DELETE_ROOT_OR_HOME: &str = "delete-root-or-home";
pub const DISK_WIPE: &str = "disk-wipe";
pub const FORK_BOMB: &str = "fork-bomb";
pub const PRIVILEGED_DESTRUCTIVE: &str = "privileged-destructive";
pub const RECURSIVE_CHMOD_ROOT: &str = "recursive-chmod-root";
pub const MOVE_ROOT: &str = "move-root";
pub const PIPE_TO_SHELL: &str = "pipe-to-shell";
pub const POWER_STATE: &str = "power-state";

// Confirmation rule ids.
pub const PRIVILEGED: &str = "privileged";
pub const GIT_FORCE_PUSH: &str = "git-force-push";
pub const GIT_RESET_HARD: &str = "git-reset-hard";
pub const KILL_PROCESS: &str = "kill-process";
pub const TERRAFORM_MUTATION: &str = "terraform-mutation";
pub const KUBECTL_MUTATION: &str = "kubectl-mutation";
pub const DOCKER_REMOVAL: &str = "docker-removal";
pub const DELETE_FILES: &str = "delete-files";
pub const SQL_DESTRUCTIVE: &str = "sql-destructive";
pub const SHELL_FROM_PIPE: &str = "shell-from-pipe";

// Bases for verdicts that do not come from a rule.
pub const MODEL_JUDGMENT: &str = "model-judgment";
pub const SEMANTIC_UNAVAILABLE: &str = "semantic-check-unavailable";
pub const PATTERN_CLEAN: &str = "pattern-clean";

/// Verbs that turn a privileged command into a blocked one.
const DESTRUCTIVE_VERBS: &[&str] = &[
    "rm", "dd", "shred", "wipefs", "chmod", "chown", "mv", "truncate", "fdisk", "parted",
];

/// Prefix commands that run their arguments as another command.
const WRAPPERS: &[&str] = &[
    "env", "nohup", "nice", "time", "command", "exec", "builtin", "xargs", "timeout", "{", "!",
    "then", "do", "else",
];

const SHELLS: &[&str] = &["sh", "bash", "zsh", "dash", "ksh"];

/// Nesting limit for `sh -c`, `eval` and similar re-parsed strings.
const MAX_NESTING: usize = 4;

const SYSTEM_DIRS: &[&str] = &[
    "/bin", "/boot", "/dev", "/etc", "/home", "/lib", "/lib64", "/opt", "/proc", "/root",
    "/sbin", "/srv", "/sys", "/usr", "/var", "/Users", "/System", "/Library", "/Applications",
];

/// Device writes that are harmless.
const SAFE_DEVICES: &[&str] = &["/dev/null", "/dev/zero", "/dev/stdout", "/dev/stderr", "/dev/tty"];

/// A regular expression matched against the whole command line.
#[derive(Debug)]
struct LineRule {
    id: &'static str,
    level: SafetyLevel,
    regex: Regex,
}

impl LineRule {
    fn compile(id: &'static str, level: SafetyLevel, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            id,
            level,
            regex: Regex::new(pattern)?,
        })
    }
}

/// One simple command after wrappers and assignments are stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    program: String,
    args: Vec<String>,
    privileged: bool,
    /// A shell reading its script from the previous pipeline stage.
    from_pipe: bool,
}

impl Invocation {
    fn new(program: &str, args: Vec<String>, privileged: bool) -> Self {
        Self {
            program: program.to_string(),
            args,
            privileged,
            from_pipe: false,
        }
    }

    fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    fn operands(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(String::as_str).filter(|a| !a.starts_with('-'))
    }

    /// Short option letter present in any `-xyz` cluster, or the long form.
    fn has_flag(&self, short: char, long: &str) -> bool {
        self.args.iter().take_while(|a| *a != "--").any(|a| {
            a == long || (a.starts_with('-') && !a.starts_with("--") && a.contains(short))
        })
    }

    fn subcommand(&self) -> Option<&str> {
        self.operands().next()
    }

    fn reads_script_from_stdin(&self) -> bool {
        SHELLS.contains(&self.program.as_str()) && matches!(shell_script(&self.args), ShellScript::Stdin)
    }
}

/// Where a shell takes its script from.
#[derive(Debug, PartialEq, Eq)]
enum ShellScript<'a> {
    Inline(&'a str),
    Stdin,
    File,
}

/// Reads a shell's arguments the way the shell does: option clusters first
/// (`-c` anywhere in a cluster such as `-lc` means an inline script), then
/// the script string or file.
fn shell_script(args: &[String]) -> ShellScript<'_> {
    let mut inline = false;
    let mut stdin = false;
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "--" || arg == "-" {
            i += 1;
            break;
        }
        if arg.starts_with("--") {
            i += if matches!(arg, "--rcfile" | "--init-file") { 2 } else { 1 };
            continue;
        }
        let Some(cluster) = arg.strip_prefix('-').or_else(|| arg.strip_prefix('+')) else {
            break;
        };
        if arg.starts_with('-') {
            inline |= cluster.contains('c');
            stdin |= cluster.contains('s');
        }
        // `-o pipefail`, `+O extglob`
        i += if cluster.ends_with(['o', 'O']) { 2 } else { 1 };
    }
    match args.get(i) {
        Some(script) if inline => ShellScript::Inline(script.as_str()),
        _ if inline => ShellScript::File,
        None => ShellScript::Stdin,
        Some(_) if stdin => ShellScript::Stdin,
        Some(_) => ShellScript::File,
    }
}

/// Options of a wrapper that consume the following word.
fn wrapper_value_options(wrapper: &str) -> &'static [&'static str] {
    match wrapper {
        "env" => &["-u", "--unset", "-C", "--chdir"],
        "nice" => &["-n", "--adjustment"],
        "timeout" => &["-s", "--signal", "-k", "--kill-after"],
        "xargs" => &[
            "-n", "--max-args", "-I", "-L", "--max-lines", "-P", "--max-procs", "-d", "--delimiter",
            "-a", "--arg-file", "-E", "-s", "--max-chars",
        ],
        "exec" => &["-a"],
        "time" => &["-f", "--format", "-o", "--output"],
        _ => &[],
    }
}

/// The script of `env -S script` / `env --split-string=script`, and the
/// index of the first word after it.
fn env_split_string<'a>(words: &'a [String], i: usize) -> Option<(&'a str, usize)> {
    let arg = words[i].as_str();
    match arg {
        "-S" | "--split-string" => words.get(i + 1).map(|v| (v.as_str(), i + 2)),
        _ => arg
            .strip_prefix("--split-string=")
            .or_else(|| arg.strip_prefix("-S"))
            .filter(|v| !v.is_empty())
            .map(|v| (v, i + 1)),
    }
}

/// Commands a `find` runs per match: the words after each `-exec`-style
/// action, up to its `;` or `+`.
fn find_actions(args: &[String]) -> Vec<&[String]> {
    let mut actions = Vec::new();
    let mut rest = args;
    while let Some(start) = rest
        .iter()
        .position(|a| matches!(a.as_str(), "-exec" | "-execdir" | "-ok" | "-okdir"))
    {
        let tail = &rest[start + 1..];
        let end = tail.iter().position(|a| a == ";" || a == "+").unwrap_or(tail.len());
        actions.push(&tail[..end]);
        rest = &tail[end..];
    }
    actions
}

/// Starting points of a `find`, after its `-H`/`-L`/`-P` options.
fn find_roots(args: &[String]) -> impl Iterator<Item = &str> {
    args.iter()
        .map(String::as_str)
        .skip_while(|a| matches!(*a, "-H" | "-L" | "-P") || a.starts_with("-O"))
        .take_while(|a| !a.starts_with('-') && !matches!(*a, "(" | "!" | ","))
}

fn find_deletes(inv: &Invocation) -> bool {
    inv.has_arg("-delete")
        || find_actions(&inv.args).into_iter().any(|action| {
            let mut resolved = Vec::new();
            resolve_segment(action, false, 0, &mut resolved);
            resolved.iter().any(|r| r.program == "rm")
        })
}

/// Text an `echo` or `printf` writes, as the shell downstream would read it.
fn echoed_text(inv: &Invocation) -> Option<String> {
    let args: Vec<&str> = match inv.program.as_str() {
        "echo" => inv
            .args
            .iter()
            .map(String::as_str)
            .skip_while(|a| matches!(*a, "-e" | "-E" | "-n" | "-ne" | "-en"))
            .collect(),
        "printf" => inv.args.iter().map(String::as_str).filter(|a| *a != "--").collect(),
        _ => return None,
    };
    Some(args.join(" ").replace("\\n", "\n"))
}

/// Deterministic rules. Holds nothing but compiled patterns, so the same
/// command always gets the same answer.
#[derive(Debug)]
pub struct PatternLayer {
    line_rules: Vec<LineRule>,
    function_def: Regex,
}

impl PatternLayer {
    pub fn new() -> Result<Self, regex::Error> {
        use SafetyLevel::{Blocked, NeedsConfirmation};
        Ok(Self {
            line_rules: vec![
                LineRule::compile(
                    PIPE_TO_SHELL,
                    Blocked,
                    r"\b(curl|wget|fetch)\b[^|;&]*\|\s*(sudo\s+(-\S+\s+)*)?(ba|z|da|k)?sh\b",
                )?,
                LineRule::compile(
                    DISK_WIPE,
                    Blocked,
                    r">\s*/dev/(sd[a-z]|nvme\d|hd[a-z]|disk\d|mmcblk\d|xvd[a-z]|vd[a-z])",
                )?,
                LineRule::compile(
                    SQL_DESTRUCTIVE,
                    NeedsConfirmation,
                    r"(?i)\b(drop\s+(table|database|schema)|truncate\s+table|delete\s+from)\b",
                )?,
            ],
            function_def: Regex::new(r"([\w:.-]+)\s*(?:\(\s*\))?\s*\{([^}]*)\}")?,
        })
    }

    /// The first matching rule's verdict, or `None` when nothing matched.
    /// Blocked rules are checked before confirmation rules.
    pub fn check(&self, command: &str) -> Option<SafetyVerdict> {
        let invocations = parse_command_line(command);

        if self.defines_fork_bomb(command) {
            return Some(SafetyVerdict::blocked(FORK_BOMB));
        }
        if let Some(rule) = self.line_rule(command, SafetyLevel::Blocked) {
            return Some(SafetyVerdict::blocked(rule));
        }
        if let Some(rule) = invocations.iter().find_map(blocked_rule) {
            return Some(SafetyVerdict::blocked(rule));
        }
        if let Some(rule) = invocations.iter().find_map(confirmation_rule) {
            return Some(SafetyVerdict::needs_confirmation(rule));
        }
        self.line_rule(command, SafetyLevel::NeedsConfirmation)
            .map(SafetyVerdict::needs_confirmation)
    }

    /// A function whose body pipes the function into a background copy of
    /// itself, such as `:(){ :|:& };:` under any name.
    fn defines_fork_bomb(&self, command: &str) -> bool {
        self.function_def.captures_iter(command).any(|caps| {
            let name = &caps[1];
            let body: String = caps[2].chars().filter(|c| !c.is_whitespace()).collect();
            body.contains(&format!("{name}|{name}&"))
        })
    }

    fn line_rule(&self, command: &str, level: SafetyLevel) -> Option<&'static str> {
        self.line_rules
            .iter()
            .find(|r| r.level == level && r.regex.is_match(command))
            .map(|r| r.id)
    }
}

fn blocked_rule(inv: &Invocation) -> Option<&'static str> {
    let program = inv.program.as_str();
    match program {
        "rm" => {
            let recursive = inv.has_flag('r', "--recursive") || inv.has_flag('R', "--recursive");
            if recursive && inv.operands().any(is_root_or_home) {
                return Some(DELETE_ROOT_OR_HOME);
            }
            if recursive && inv.has_flag('f', "--force") {
                return Some(RECURSIVE_FORCE_DELETE);
            }
        }
        "dd" => {
            let writes_device = inv.args.iter().any(|a| {
                a.strip_prefix("of=")
                    .is_some_and(|dst| dst.starts_with("/dev/") && !SAFE_DEVICES.contains(&dst))
            });
            if writes_device {
                return Some(DISK_WIPE);
            }
        }
        "find" if find_deletes(inv) && find_roots(&inv.args).any(is_root_or_home) => {
            return Some(DELETE_ROOT_OR_HOME);
        }
        "wipefs" => return Some(DISK_WIPE),
        "shred" if inv.operands().any(|a| a.starts_with("/dev/")) => return Some(DISK_WIPE),
        p if p.starts_with("mkfs") => return Some(DISK_WIPE),
        "chmod" | "chown" | "chgrp" => {
            if inv.has_flag('R', "--recursive") && inv.operands().any(is_root_or_home) {
                return Some(RECURSIVE_CHMOD_ROOT);
            }
        }
        "mv" => {
            let operands: Vec<&str> = inv.operands().collect();
            if let Some((_, sources)) = operands.split_last() {
                if sources.iter().any(|s| is_root_or_home(s)) {
                    return Some(MOVE_ROOT);
                }
            }
        }
        "shutdown" | "reboot" | "halt" | "poweroff" => return Some(POWER_STATE),
        "systemctl" if ["poweroff", "reboot", "halt"].iter().any(|a| inv.has_arg(a)) => {
            return Some(POWER_STATE);
        }
        "init" if inv.has_arg("0") || inv.has_arg("6") => return Some(POWER_STATE),
        _ => {}
    }

    if inv.privileged && DESTRUCTIVE_VERBS.contains(&program) {
        return Some(PRIVILEGED_DESTRUCTIVE);
    }
    None
}

fn confirmation_rule(inv: &Invocation) -> Option<&'static str> {
    if inv.privileged {
        return Some(PRIVILEGED);
    }
    if inv.from_pipe {
        return Some(SHELL_FROM_PIPE);
    }
    let sub = inv.subcommand();
    match inv.program.as_str() {
        "git" if sub == Some("push") => {
            let forced = inv.has_arg("--force")
                || inv.has_arg("-f")
                || inv.args.iter().any(|a| a.starts_with("--force-with-lease"))
                || inv.operands().skip(1).any(|a| a.starts_with('+'));
            forced.then_some(GIT_FORCE_PUSH)
        }
        "git" if sub == Some("reset") && inv.has_arg("--hard") => Some(GIT_RESET_HARD),
        "kill" | "pkill" | "killall" => Some(KILL_PROCESS),
        "terraform" if matches!(sub, Some("apply" | "destroy")) => Some(TERRAFORM_MUTATION),
        "kubectl" if ["delete", "apply", "scale"].iter().any(|a| inv.has_arg(a)) => {
            Some(KUBECTL_MUTATION)
        }
        "docker" => {
            let removes = matches!(sub, Some("rm" | "rmi"))
                || (inv.has_arg("prune") && inv.has_arg("system"))
                || (matches!(sub, Some("container" | "image" | "volume")) && inv.has_arg("rm"));
            removes.then_some(DOCKER_REMOVAL)
        }
        "rm" | "rmdir" | "unlink" => Some(DELETE_FILES),
        "find" if inv.has_arg("-delete") => Some(DELETE_FILES),
        _ => None,
    }
}

/// `/`, `~`, `$HOME` and top-level system directories, with or without a
/// trailing `/` or `/*`.
fn is_root_or_home(target: &str) -> bool {
    let trimmed = target.trim_end_matches('*').trim_end_matches('/');
    if trimmed.is_empty() {
        // "/", "/*", "//"
        return target.starts_with('/');
    }
    matches!(trimmed, "~" | "$HOME" | "${HOME}") || SYSTEM_DIRS.contains(&trimmed)
}

/// One simple command's words, and whether a single `|` feeds it.
#[derive(Debug, Default, PartialEq, Eq)]
struct Segment {
    words: Vec<String>,
    piped: bool,
}

fn push_segment(segments: &mut Vec<Segment>, words: &mut Vec<String>, piped: &mut bool) {
    if !words.is_empty() {
        segments.push(Segment {
            words: std::mem::take(words),
            piped: std::mem::take(piped),
        });
    }
}

/// Splits a command line into simple commands. Understands quoting,
/// backslash escapes, control operators and subshell delimiters; it is not
/// a shell parser and errs toward producing more command starts, not fewer.
fn split_segments(line: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut single = false;
    let mut double = false;
    let mut piped = false;
    let mut saved_quotes: Vec<bool> = Vec::new();
    let mut backtick: Option<bool> = None;
    let mut chars = line.chars().peekable();

    let end_word = |words: &mut Vec<String>, word: &mut String, in_word: &mut bool| {
        if *in_word {
            words.push(std::mem::take(word));
            *in_word = false;
        }
    };

    while let Some(c) = chars.next() {
        if single {
            if c == '\'' {
                single = false;
            } else {
                word.push(c);
            }
            continue;
        }
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    word.push(next);
                    in_word = true;
                }
            }
            '"' => {
                double = !double;
                in_word = true;
            }
            '\'' if !double => {
                single = true;
                in_word = true;
            }
            // Subshells and command substitutions are commands of their
            // own, even inside double quotes.
            '(' | ')' | '`' => {
                if word.ends_with('$') {
                    word.pop();
                }
                end_word(&mut words, &mut word, &mut in_word);
                push_segment(&mut segments, &mut words, &mut piped);
                match c {
                    '(' => {
                        saved_quotes.push(double);
                        double = false;
                    }
                    ')' => double = saved_quotes.pop().unwrap_or(false),
                    _ => match backtick.take() {
                        Some(outer) => double = outer,
                        None => {
                            backtick = Some(double);
                            double = false;
                        }
                    },
                }
            }
            _ if double => word.push(c),
            ';' | '|' | '&' | '\n' => {
                end_word(&mut words, &mut word, &mut in_word);
                push_segment(&mut segments, &mut words, &mut piped);
                if c == '|' {
                    match chars.peek() {
                        Some('|') => {
                            chars.next();
                        }
                        Some('&') => {
                            chars.next();
                            piped = true;
                        }
                        _ => piped = true,
                    }
                }
            }
            c if c.is_whitespace() => end_word(&mut words, &mut word, &mut in_word),
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }
    end_word(&mut words, &mut word, &mut in_word);
    push_segment(&mut segments, &mut words, &mut piped);
    segments
}

fn parse_command_line(line: &str) -> Vec<Invocation> {
    let mut out = Vec::new();
    collect_invocations(line, false, 0, &mut out);
    out
}

fn collect_invocations(line: &str, privileged: bool, depth: usize, out: &mut Vec<Invocation>) {
    if depth > MAX_NESTING {
        return;
    }
    let mut upstream: Option<Invocation> = None;
    for segment in split_segments(line) {
        let start = out.len();
        resolve_segment(&segment.words, privileged, depth, out);
        let resolved = out[start..].last().cloned();
        if segment.piped {
            // `echo 'cmd' | bash` runs the echoed text.
            if let Some(pos) = out[start..].iter().position(Invocation::reads_script_from_stdin) {
                let shell = &mut out[start + pos];
                shell.from_pipe = true;
                let privileged = shell.privileged;
                if let Some(text) = upstream.as_ref().and_then(echoed_text) {
                    collect_invocations(&text, privileged, depth + 1, out);
                }
            }
        }
        upstream = resolved;
    }
}

fn resolve_segment(words: &[String], mut privileged: bool, depth: usize, out: &mut Vec<Invocation>) {
    let mut i = 0;
    while i < words.len() {
        let word = words[i].as_str();
        if is_assignment(word) {
            i += 1;
            continue;
        }
        let program = word.rsplit('/').next().unwrap_or(word);
        match program {
            "sudo" | "doas" => {
                privileged = true;
                i += 1;
                while i < words.len() && words[i].starts_with('-') {
                    let takes_value = matches!(words[i].as_str(), "-u" | "-g" | "-C" | "-h" | "-p" | "-U");
                    i += if takes_value { 2 } else { 1 };
                }
            }
            "su" => {
                if let Some(pos) = words[i..].iter().position(|w| w == "-c") {
                    if let Some(inner) = words.get(i + pos + 1) {
                        collect_invocations(inner, true, depth + 1, out);
                    }
                }
                out.push(Invocation::new("su", words[i + 1..].to_vec(), true));
                return;
            }
            "eval" => {
                collect_invocations(&words[i + 1..].join(" "), privileged, depth + 1, out);
                return;
            }
            p if SHELLS.contains(&p) => {
                let args = &words[i + 1..];
                match shell_script(args) {
                    ShellScript::Inline(script) => collect_invocations(script, privileged, depth + 1, out),
                    _ => out.push(Invocation::new(p, args.to_vec(), privileged)),
                }
                return;
            }
            "find" => {
                let args = &words[i + 1..];
                out.push(Invocation::new("find", args.to_vec(), privileged));
                for action in find_actions(args) {
                    resolve_segment(action, privileged, depth, out);
                }
                return;
            }
            p if WRAPPERS.contains(&p) => {
                let takes_value = wrapper_value_options(p);
                i += 1;
                while i < words.len() {
                    let arg = words[i].as_str();
                    if arg == "--" {
                        i += 1;
                        break;
                    }
                    if p == "env" {
                        if let Some((script, rest)) = env_split_string(words, i) {
                            let mut line = script.to_string();
                            for w in words.get(rest..).unwrap_or_default() {
                                line.push(' ');
                                line.push_str(w);
                            }
                            collect_invocations(&line, privileged, depth + 1, out);
                            return;
                        }
                    }
                    if is_assignment(arg) {
                        i += 1;
                    } else if arg.starts_with('-') {
                        i += if takes_value.contains(&arg) { 2 } else { 1 };
                    } else {
                        break;
                    }
                }
                if p == "timeout" && i < words.len() {
                    // duration operand
                    i += 1;
                }
            }
            _ => {
                out.push(Invocation::new(program, words[i + 1..].to_vec(), privileged));
                return;
            }
        }
    }
    if privileged {
        // bare `sudo` or `sudo -s`
        out.push(Invocation::new("sudo", Vec::new(), privileged));
    }
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Two-layer gate; see the module docs.
pub struct SafetyGate {
    patterns: PatternLayer,
    semantic: Option<Arc<ProviderChain>>,
}

impl SafetyGate {
    /// Gate with the pattern layer only; clean commands are `Safe`.
    pub fn pattern_only() -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: PatternLayer::new()?,
            semantic: None,
        })
    }

    /// Gate that asks `chain` about commands the pattern layer leaves alone.
    pub fn with_semantic(chain: Arc<ProviderChain>) -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: PatternLayer::new()?,
            semantic: Some(chain),
        })
    }

    /// Deterministic layer alone.
    pub fn check_patterns(&self, command: &str) -> Option<SafetyVerdict> {
        self.patterns.check(command)
    }

    /// Full assessment of one command, run in `cwd` when known.
    pub async fn assess(&self, command: &str, cwd: Option<&str>) -> SafetyVerdict {
        if let Some(verdict) = self.patterns.check(command) {
            info!("Pattern layer: `{}` -> {:?} ({})", command, verdict.level, verdict.basis);
            return verdict;
        }

        let Some(chain) = &self.semantic else {
            debug!("No semantic layer, `{}` is safe", command);
            return SafetyVerdict::safe(PATTERN_CLEAN);
        };

        let request = ProviderRequest::new(RequestRole::AssessSafety, command)
            .with_cwd(cwd.map(str::to_string));
        let verdict = match chain.send(&request).await {
            Ok(response) => match response.payload {
                ResponsePayload::Judgment { judgment, reason } => {
                    let basis = format!("{}: {}", MODEL_JUDGMENT, reason);
                    match judgment {
                        Judgment::Safe => SafetyVerdict::safe(basis),
                        Judgment::Confirm => SafetyVerdict::needs_confirmation(basis),
                        Judgment::Block => SafetyVerdict::blocked(basis),
                    }
                }
                _ => SafetyVerdict::needs_confirmation(SEMANTIC_UNAVAILABLE),
            },
            Err(e) => {
                warn!("Semantic safety check failed for `{}`: {}", command, e);
                SafetyVerdict::needs_confirmation(SEMANTIC_UNAVAILABLE)
            }
        };
        info!("Semantic layer: `{}` -> {:?}", command, verdict.level);
        verdict
    }
}
