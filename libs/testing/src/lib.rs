//! Test doubles for kmirror.
//!
//! - [`ScriptedRunner`]: a [`CommandRunner`] answering from canned rules and
//!   recording every invocation
//! - [`StaticFetcher`]: a [`TextFetcher`] serving fixed bodies per URL
//! - fixture builders for kubeadm output and `constants.go` text

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use kmirror_images::{CommandError, CommandOutput, CommandRunner, FetchError, TextFetcher};

/// A recorded command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// `program arg1 arg2 ...`
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Success(String),
    Failure(String),
}

#[derive(Debug, Clone)]
struct Rule {
    program: String,
    args_prefix: Vec<String>,
    reply: Reply,
}

impl Rule {
    fn matches(&self, program: &str, args: &[&str]) -> bool {
        self.program == program
            && self.args_prefix.len() <= args.len()
            && self.args_prefix.iter().zip(args).all(|(a, b)| a == b)
    }
}

/// Scripted [`CommandRunner`].
///
/// Rules match on program name plus an argument prefix; the longest matching
/// prefix wins. Unmatched commands succeed with empty output. Programs are
/// only visible to `look_path` once marked [`installed`](Self::installed).
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    installed: HashSet<String>,
    rules: Vec<Rule>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `program` resolvable on the fake `PATH`.
    pub fn installed(mut self, program: &str) -> Self {
        self.installed.insert(program.to_string());
        self
    }

    /// Succeed with `stdout` for commands starting with `args`.
    pub fn succeed(self, program: &str, args: &[&str], stdout: &str) -> Self {
        self.rule(program, args, Reply::Success(stdout.to_string()))
    }

    /// Exit non-zero with `output` for commands starting with `args`.
    pub fn fail(self, program: &str, args: &[&str], output: &str) -> Self {
        self.rule(program, args, Reply::Failure(output.to_string()))
    }

    fn rule(mut self, program: &str, args: &[&str], reply: Reply) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            args_prefix: args.iter().map(|a| a.to_string()).collect(),
            reply,
        });
        self
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().expect("runner state poisoned").clone()
    }

    /// Every invocation so far as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::command_line).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.calls
            .lock()
            .expect("runner state poisoned")
            .push(Invocation {
                program: program.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            });

        let rule = self
            .rules
            .iter()
            .filter(|rule| rule.matches(program, args))
            .max_by_key(|rule| rule.args_prefix.len());

        match rule.map(|r| &r.reply) {
            Some(Reply::Failure(output)) => Err(CommandError::Failed {
                program: program.to_string(),
                code: Some(1),
                output: output.clone(),
            }),
            Some(Reply::Success(stdout)) => Ok(CommandOutput::new(stdout.as_str(), "")),
            None => Ok(CommandOutput::default()),
        }
    }

    fn look_path(&self, program: &str) -> Option<PathBuf> {
        self.installed
            .contains(program)
            .then(|| PathBuf::from("/usr/local/bin").join(program))
    }
}

/// [`TextFetcher`] serving canned responses. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: HashMap<String, Result<String, u16>>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: impl Into<String>) -> Self {
        self.responses.insert(url.to_string(), Ok(body.into()));
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(url.to_string(), Err(status));
        self
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("fetcher state poisoned").clone()
    }
}

#[async_trait]
impl TextFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.requests
            .lock()
            .expect("fetcher state poisoned")
            .push(url.to_string());

        match self.responses.get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// `kubeadm config images list -o=json` output for `images`.
pub fn kubeadm_image_list(images: &[&str]) -> String {
    serde_json::json!({
        "kind": "Images",
        "apiVersion": "output.kubeadm.k8s.io/v1alpha2",
        "images": images,
    })
    .to_string()
}

/// A `constants.go` excerpt declaring the given versions.
pub fn constants_go(coredns: Option<&str>, etcd: Option<&str>, pause: Option<&str>) -> String {
    let mut text = String::from(
        "package constants\n\nconst (\n\t// KubernetesDir is the directory Kubernetes owns\n\tKubernetesDir = \"/etc/kubernetes\"\n",
    );
    if let Some(etcd) = etcd {
        text.push_str(&format!(
            "\n\t// DefaultEtcdVersion indicates the default etcd version that kubeadm uses\n\tDefaultEtcdVersion = \"{etcd}\"\n"
        ));
    }
    if let Some(pause) = pause {
        text.push_str(&format!(
            "\n\t// PauseVersion indicates the default pause image version for kubeadm\n\tPauseVersion = \"{pause}\"\n"
        ));
    }
    if let Some(coredns) = coredns {
        text.push_str(&format!(
            "\n\t// CoreDNSVersion is the version of CoreDNS to be deployed if it is used\n\tCoreDNSVersion = \"{coredns}\"\n"
        ));
    }
    text.push_str("\n\tMinExternalEtcdVersion = \"3.2.18\"\n)\n");
    text
}
