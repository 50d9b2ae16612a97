//! Integration tests for the describe pipeline
//!
//! These tests run describers end to end against an in-memory executor and
//! check the files written under a temporary salt/ansible root.

use anyhow::{bail, Result};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

use salt_describe::config::DescribeConfig;
use salt_describe::describe::{ConfigSystem, DescribeOrchestrator, DescribeRequest};
use salt_describe::remote::{FactResult, RemoteExecutor, TargetType};

type Call = (String, TargetType, String, Vec<(String, String)>);

/// Executor answering every function from a fixed table
#[derive(Default)]
struct StaticExecutor {
    returns: BTreeMap<String, FactResult>,
    calls: Mutex<Vec<Call>>,
}

impl StaticExecutor {
    fn with(mut self, function: &str, yaml: &str) -> Self {
        let result: FactResult = serde_yaml::from_str(yaml).unwrap();
        self.returns.insert(function.to_string(), result);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for StaticExecutor {
    async fn execute(
        &self,
        target: &str,
        target_type: TargetType,
        function: &str,
        kwargs: &[(String, String)],
    ) -> Result<FactResult> {
        self.calls.lock().unwrap().push((
            target.to_string(),
            target_type,
            function.to_string(),
            kwargs.to_vec(),
        ));
        match self.returns.get(function) {
            Some(result) => Ok(result.clone()),
            None => bail!("'{}' is not available.", function),
        }
    }
}

fn config_in(temp_dir: &TempDir) -> DescribeConfig {
    let mut file_roots = BTreeMap::new();
    file_roots.insert("base".to_string(), vec![temp_dir.path().join("salt")]);
    DescribeConfig {
        file_roots,
        ansible_root: temp_dir.path().join("ansible"),
        ..DescribeConfig::default()
    }
}

/// Collects formatted log lines so tests can assert on warnings
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn read_yaml(path: &Path) -> Value {
    serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

const FIREWALLD_RET: &str = r#"
minion:
  public:
    target: [default]
    icmp-block-inversion: ["no"]
    interfaces: [""]
    sources: [""]
    services: [dhcpv6-client ssh]
    ports: [""]
    protocols: [""]
    forward: ["yes"]
    masquerade: ["no"]
    forward-ports: [""]
    source-ports: [""]
    icmp-blocks: [""]
    rich rules: [""]
"#;

/// Test describing firewalld into a salt state
#[tokio::test]
async fn test_firewalld() {
    let temp_dir = TempDir::new().unwrap();
    let executor = Arc::new(StaticExecutor::default().with("firewalld.list_all", FIREWALLD_RET));
    let orchestrator = DescribeOrchestrator::new(executor.clone(), config_in(&temp_dir));

    let report = orchestrator
        .describe_by_name("firewalld", &DescribeRequest::new("minion"))
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(report.to_string().contains("Generated SLS file locations"));

    let sls_path = temp_dir.path().join("salt/minion/firewalld.sls");
    assert_eq!(report.generated, vec![sls_path.clone()]);

    let expected: Value = serde_yaml::from_str(
        r#"
add_firewalld_rule_0:
  firewalld.present:
  - name: public
  - services:
    - dhcpv6-client
    - ssh
"#,
    )
    .unwrap();
    assert_eq!(read_yaml(&sls_path), expected);

    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "minion");
    assert_eq!(calls[0].1, TargetType::Glob);
    assert_eq!(calls[0].2, "firewalld.list_all");
}

/// Test that a minion without firewalld is skipped rather than formatted
#[tokio::test]
async fn test_firewalld_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let executor = Arc::new(StaticExecutor::default().with(
        "firewalld.list_all",
        r#"
minion: "'firewalld' __virtual__ returned False: The firewalld execution module cannot be loaded: the firewall-cmd binary is not in the path."
"#,
    ));
    let orchestrator = DescribeOrchestrator::new(executor, config_in(&temp_dir));

    let report = orchestrator
        .describe_by_name("firewalld", &DescribeRequest::new("minion"))
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(report.generated.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].minion, "minion");
    assert_eq!(report.skipped[0].describer, "firewalld");
    assert!(!temp_dir.path().join("salt/minion").exists());
}

/// Test that an unwritable file root gives a failed report
#[tokio::test]
async fn test_firewalld_permission_denied() {
    // root ignores directory permissions
    if nix::unistd::geteuid().is_root() {
        return;
    }

    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let salt_root = temp_dir.path().join("salt");
    fs::create_dir_all(&salt_root).unwrap();
    fs::set_permissions(&salt_root, fs::Permissions::from_mode(0o555)).unwrap();

    let executor = Arc::new(StaticExecutor::default().with("firewalld.list_all", FIREWALLD_RET));
    let orchestrator = DescribeOrchestrator::new(executor, config_in(&temp_dir));

    let logs = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    let report = orchestrator
        .describe_by_name("firewalld", &DescribeRequest::new("minion"))
        .await
        .unwrap();
    drop(guard);

    fs::set_permissions(&salt_root, fs::Permissions::from_mode(0o755)).unwrap();

    let expected = format!(
        "Unable to create directory {}.  Check that the salt user has the correct permissions.",
        salt_root.join("minion").display()
    );
    assert!(logs.contents().contains(&expected), "logs: {}", logs.contents());
    assert!(!report.is_success());
    assert_eq!(report.failed, vec!["minion".to_string()]);
    assert!(report.generated.is_empty());
}

/// Test pip with a bin_env, written for every minion
#[tokio::test]
async fn test_pip_multiple_minions() {
    let temp_dir = TempDir::new().unwrap();
    let executor = Arc::new(StaticExecutor::default().with(
        "pip.freeze",
        r#"
web1: [requests==2.31.0]
web2: [flask==3.0.0, requests==2.31.0]
"#,
    ));
    let orchestrator = DescribeOrchestrator::new(executor.clone(), config_in(&temp_dir));

    let request = DescribeRequest::new("web1,web2")
        .with_target_type(TargetType::List)
        .with_bin_env("/opt/venv");
    let report = orchestrator.describe_by_name("pip", &request).await.unwrap();

    assert_eq!(report.generated.len(), 2);
    let web2: Value = read_yaml(&temp_dir.path().join("salt/web2/pip.sls"));
    let expected: Value = serde_yaml::from_str(
        r#"
installed_pip_libraries:
  pip.installed:
  - pkgs: [flask==3.0.0, requests==2.31.0]
  - bin_env: /opt/venv
"#,
    )
    .unwrap();
    assert_eq!(web2, expected);

    let calls = executor.calls();
    assert_eq!(calls[0].1, TargetType::List);
    assert_eq!(
        calls[0].3,
        vec![("bin_env".to_string(), "/opt/venv".to_string())]
    );

    let top = read_yaml(&temp_dir.path().join("salt/top.sls"));
    let expected_top: Value =
        serde_yaml::from_str("base:\n  web1: [web1]\n  web2: [web2]\n").unwrap();
    assert_eq!(top, expected_top);
}

/// Test that dotted minion ids are written under a slug the top file can reference
#[tokio::test]
async fn test_dotted_minion_id() {
    let temp_dir = TempDir::new().unwrap();
    let executor =
        Arc::new(StaticExecutor::default().with("timezone.get_zone", "web1.example.com: UTC"));
    let orchestrator = DescribeOrchestrator::new(executor, config_in(&temp_dir));

    let report = orchestrator
        .describe_by_name("timezone", &DescribeRequest::new("web1.example.com"))
        .await
        .unwrap();

    let sls_path = temp_dir.path().join("salt/web1_example_com/timezone.sls");
    assert_eq!(report.generated, vec![sls_path]);

    let init = read_yaml(&temp_dir.path().join("salt/web1_example_com/init.sls"));
    let expected: Value = serde_yaml::from_str("include: [web1_example_com.timezone]\n").unwrap();
    assert_eq!(init, expected);

    let top = read_yaml(&temp_dir.path().join("salt/top.sls"));
    let expected_top: Value =
        serde_yaml::from_str("base:\n  web1.example.com: [web1_example_com]\n").unwrap();
    assert_eq!(top, expected_top);
}

/// Test that minion ids which would leave the file root are skipped
#[tokio::test]
async fn test_unsafe_minion_ids_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let executor = Arc::new(StaticExecutor::default().with(
        "timezone.get_zone",
        r#"
"../evil": UTC
"/etc/cron.d": UTC
"..": UTC
good: UTC
"#,
    ));
    let orchestrator = DescribeOrchestrator::new(executor, config_in(&temp_dir));

    let report = orchestrator
        .describe_by_name("timezone", &DescribeRequest::new("*"))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(
        report.generated,
        vec![temp_dir.path().join("salt/good/timezone.sls")]
    );
    let mut skipped: Vec<&str> = report.skipped.iter().map(|s| s.minion.as_str()).collect();
    skipped.sort();
    assert_eq!(skipped, vec!["..", "../evil", "/etc/cron.d"]);
    assert!(!temp_dir.path().join("evil").exists());
    assert!(!temp_dir.path().join("salt/evil").exists());
}

/// Test timezone into an ansible playbook
#[tokio::test]
async fn test_timezone_ansible() {
    let temp_dir = TempDir::new().unwrap();
    let executor =
        Arc::new(StaticExecutor::default().with("timezone.get_zone", "minion: America/Los_Angeles"));
    let orchestrator = DescribeOrchestrator::new(executor, config_in(&temp_dir));

    let request = DescribeRequest::new("minion")
        .with_config_system(ConfigSystem::Ansible)
        .with_hosts("minion");
    let report = orchestrator
        .describe_by_name("timezone", &request)
        .await
        .unwrap();

    let playbook_path = temp_dir.path().join("ansible/minion/timezone.yml");
    assert_eq!(report.generated, vec![playbook_path.clone()]);
    let expected: Value = serde_yaml::from_str(
        r#"
- hosts: minion
  tasks:
  - name: Set timezone
    community.general.timezone:
      name: America/Los_Angeles
"#,
    )
    .unwrap();
    assert_eq!(read_yaml(&playbook_path), expected);
    assert!(temp_dir.path().join("ansible/minion/site.yml").exists());
}

/// Test timezone into a salt state
#[tokio::test]
async fn test_timezone_salt() {
    let temp_dir = TempDir::new().unwrap();
    let executor =
        Arc::new(StaticExecutor::default().with("timezone.get_zone", "minion: America/Los_Angeles"));
    let orchestrator = DescribeOrchestrator::new(executor, config_in(&temp_dir));

    orchestrator
        .describe_by_name("timezone", &DescribeRequest::new("minion"))
        .await
        .unwrap();

    let expected: Value =
        serde_yaml::from_str("America/Los_Angeles:\n  timezone.system: []\n").unwrap();
    assert_eq!(
        read_yaml(&temp_dir.path().join("salt/minion/timezone.sls")),
        expected
    );
}

/// Test that describe_all keeps going when functions are missing but reports them
#[tokio::test]
async fn test_describe_all() {
    let temp_dir = TempDir::new().unwrap();
    let executor = Arc::new(
        StaticExecutor::default()
            .with("timezone.get_zone", "minion: UTC")
            .with("pip.freeze", "minion: [requests==2.31.0]"),
    );
    let orchestrator = DescribeOrchestrator::new(executor.clone(), config_in(&temp_dir));

    let report = orchestrator
        .describe_all(&DescribeRequest::new("minion"))
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.generated.len(), 2);
    assert!(executor.calls().len() >= 6);
    let mut failed: Vec<&str> = report.errors.iter().map(|e| e.describer.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["firewalld", "pkg", "service", "sysctl"]);
    assert!(report.to_string().contains("Failed describers:"));

    let init = read_yaml(&temp_dir.path().join("salt/minion/init.sls"));
    let expected: Value =
        serde_yaml::from_str("include: [minion.pip, minion.timezone]\n").unwrap();
    assert_eq!(init, expected);
}

/// Test that describe_all is an error when nothing could be described
#[tokio::test]
async fn test_describe_all_every_call_fails() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator =
        DescribeOrchestrator::new(Arc::new(StaticExecutor::default()), config_in(&temp_dir));

    let err = orchestrator
        .describe_all(&DescribeRequest::new("minion"))
        .await
        .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Every describer failed"), "{}", message);
    assert!(!temp_dir.path().join("salt").exists());
}

/// Test unknown describer names
#[tokio::test]
async fn test_unknown_describer() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator =
        DescribeOrchestrator::new(Arc::new(StaticExecutor::default()), config_in(&temp_dir));

    let err = orchestrator
        .describe_by_name("chef", &DescribeRequest::new("minion"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unknown describer 'chef'"));
}

/// Test that a failing remote call is an error for a single describer
#[tokio::test]
async fn test_remote_failure_propagates() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator =
        DescribeOrchestrator::new(Arc::new(StaticExecutor::default()), config_in(&temp_dir));

    let err = orchestrator
        .describe_by_name("sysctl", &DescribeRequest::new("minion"))
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("sysctl.show"));
}
