//! Executor integration tests
//!
//! Runs operations against in-memory node transports and collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use ep_core::config::{self, ExecutorConfig, RegistrySettings};
use ep_core::traits::{
    AttachedIo, AuthConfig, NodeTransport, RegistryClient, RegistryEndpoint, RepositoryClient,
};
use ep_core::{CollaboratorError, NodeInfo, NodeTopology, TransportError};
use ep_executor::{Executor, ExecutorError, Operation};

#[derive(Debug, Clone, PartialEq)]
struct Run {
    command: Vec<String>,
    interactive: bool,
    stdin: Option<Vec<u8>>,
}

/// Node transport that records what it is asked to do
struct MockTransport {
    ip: String,
    output: Vec<u8>,
    fail: bool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    runs: Mutex<Vec<Run>>,
}

impl MockTransport {
    fn new(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            output: Vec::new(),
            fail: false,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
        }
    }

    fn with_output(mut self, output: &[u8]) -> Self {
        self.output = output.to_vec();
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn runs(&self) -> Vec<Run> {
        self.runs.lock().unwrap().clone()
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeTransport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run_with_attached_io(
        &self,
        command: &[String],
        mut io: AttachedIo,
    ) -> Result<(), TransportError> {
        let mut input = None;
        if let Some(mut stdin) = io.stdin.take() {
            let mut buf = Vec::new();
            stdin.read_to_end(&mut buf).await?;
            input = Some(buf);
        }
        self.runs.lock().unwrap().push(Run {
            command: command.to_vec(),
            interactive: io.interactive,
            stdin: input,
        });

        if self.fail {
            return Err(TransportError::ExitStatus {
                node: self.ip.clone(),
                status: 2,
            });
        }
        io.stdout.write_all(&self.output).await?;
        io.stdout.flush().await?;
        Ok(())
    }
}

#[derive(Default)]
struct MockRegistry {
    calls: Mutex<Vec<String>>,
}

impl MockRegistry {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn resolve_auth(
        &self,
        endpoint: &RegistryEndpoint,
    ) -> Result<AuthConfig, CollaboratorError> {
        self.record(format!("auth {}", endpoint.address()));
        Ok(AuthConfig {
            server_address: endpoint.address(),
            username: endpoint.user.clone(),
            password: endpoint.password.clone(),
        })
    }

    async fn retag_to_local(
        &self,
        image: &str,
        registry_address: &str,
    ) -> Result<String, CollaboratorError> {
        self.record(format!("retag {}", image));
        Ok(format!("{}/{}", registry_address, image))
    }

    async fn push_image(&self, image: &str, _auth: &AuthConfig) -> Result<(), CollaboratorError> {
        self.record(format!("push {}", image));
        Ok(())
    }

    async fn map_and_create_projects(
        &self,
        _endpoint: &RegistryEndpoint,
        images: &[String],
    ) -> Result<Vec<String>, CollaboratorError> {
        self.record(format!("map {}", images.join(",")));
        Ok(images.iter().map(|i| format!("library/{}", i)).collect())
    }
}

#[derive(Default)]
struct MockRepository {
    pushed: Mutex<Vec<(String, String, String)>>,
    pulled: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl RepositoryClient for MockRepository {
    async fn push_file(
        &self,
        path: &str,
        content_ref: &str,
        revision: &str,
    ) -> Result<String, CollaboratorError> {
        self.pushed.lock().unwrap().push((
            path.to_string(),
            content_ref.to_string(),
            revision.to_string(),
        ));
        Ok("sha256:0123".to_string())
    }

    async fn pull_file(&self, dest: &str, source_url: &str) -> Result<(), CollaboratorError> {
        self.pulled
            .lock()
            .unwrap()
            .push((dest.to_string(), source_url.to_string()));
        Ok(())
    }
}

fn words(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn topology(nodes: &[(&Arc<MockTransport>, &[&str])]) -> NodeTopology {
    NodeTopology::new(nodes.iter().map(|(mock, roles)| {
        let client: Arc<dyn NodeTransport> = Arc::<MockTransport>::clone(*mock);
        NodeInfo::new(mock.ip.clone(), roles.iter().copied(), client)
    }))
    .unwrap()
}

fn registry_settings() -> RegistrySettings {
    RegistrySettings {
        provider_ip: "10.0.0.1".to_string(),
        registry_port: 9000,
        user: "admin".to_string(),
        password: "secret".to_string(),
        project: "intel_ek".to_string(),
    }
}

/// day-0 at 10.0.0.1, workers at 10.0.0.2 and 10.0.0.3
struct Cluster {
    day0: Arc<MockTransport>,
    w1: Arc<MockTransport>,
    w2: Arc<MockTransport>,
}

impl Cluster {
    fn new(day0: MockTransport, w1: MockTransport, w2: MockTransport) -> Self {
        Self {
            day0: Arc::new(day0),
            w1: Arc::new(w1),
            w2: Arc::new(w2),
        }
    }

    fn plain() -> Self {
        Self::new(
            MockTransport::new("10.0.0.1"),
            MockTransport::new("10.0.0.2"),
            MockTransport::new("10.0.0.3"),
        )
    }

    fn executor(&self) -> Executor {
        Executor::new(topology(&[
            (&self.day0, &["day-0"]),
            (&self.w1, &["worker"]),
            (&self.w2, &["worker", "edge"]),
        ]))
    }

    fn connects(&self) -> usize {
        self.day0.connects() + self.w1.connects() + self.w2.connects()
    }
}

#[tokio::test]
async fn test_shell_templates_per_node() {
    let cluster = Cluster::plain();
    let executor = cluster.executor();
    let command = words(&["hostnamectl", "set-hostname", "node-{{ip}}-{{role}}"]);

    executor
        .execute(
            &["worker"],
            Operation::Shell {
                command: command.clone(),
                interactive: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        cluster.w1.runs()[0].command,
        words(&["hostnamectl", "set-hostname", "node-10.0.0.2-worker"])
    );
    assert_eq!(
        cluster.w2.runs()[0].command,
        words(&["hostnamectl", "set-hostname", "node-10.0.0.3-worker"])
    );
    assert!(!cluster.w1.runs()[0].interactive);
    assert!(cluster.day0.runs().is_empty());
    assert_eq!(command[2], "node-{{ip}}-{{role}}");

    for mock in [&cluster.w1, &cluster.w2] {
        assert_eq!(mock.connects(), 1);
        assert_eq!(mock.disconnects(), 1);
    }
}

#[tokio::test]
async fn test_shell_one_failing_node_fails_fanout() {
    let cluster = Cluster::new(
        MockTransport::new("10.0.0.1"),
        MockTransport::new("10.0.0.2"),
        MockTransport::new("10.0.0.3").failing(),
    );
    let executor = cluster.executor();

    let result = executor
        .execute(&["worker"], Operation::parse("shell", words(&["true"])).unwrap())
        .await;

    match result {
        Err(e @ ExecutorError::RemoteExecution(_)) => {
            assert_eq!(e.failed_nodes(), vec!["10.0.0.3"]);
        }
        other => panic!("Expected remote execution error, got {:?}", other),
    }
    // The healthy node still ran and was released
    assert_eq!(cluster.w1.runs().len(), 1);
    assert_eq!(cluster.w2.disconnects(), 1);
}

#[tokio::test]
async fn test_shell_reports_every_failed_node() {
    let cluster = Cluster::new(
        MockTransport::new("10.0.0.1"),
        MockTransport::new("10.0.0.2").failing(),
        MockTransport::new("10.0.0.3").failing(),
    );

    let err = cluster
        .executor()
        .execute(&["worker"], Operation::parse("shell", words(&["false"])).unwrap())
        .await
        .unwrap_err();

    let mut failed = err.failed_nodes();
    failed.sort();
    assert_eq!(failed, vec!["10.0.0.2", "10.0.0.3"]);
}

#[tokio::test]
async fn test_template_error_touches_no_node() {
    let cluster = Cluster::plain();

    let result = cluster
        .executor()
        .execute(
            &["day-0", "worker"],
            Operation::parse("shell", words(&["echo", "{{hostname}}"])).unwrap(),
        )
        .await;

    assert!(matches!(result, Err(ExecutorError::Template { .. })));
    assert_eq!(cluster.connects(), 0);
}

#[tokio::test]
async fn test_empty_target_set_is_rejected() {
    let cluster = Cluster::plain();
    let result = cluster
        .executor()
        .execute(&["gpu"], Operation::parse("shell", words(&["true"])).unwrap())
        .await;
    assert!(matches!(result, Err(ExecutorError::Validation(_))));
}

#[tokio::test]
async fn test_interactive_shell_needs_single_target() {
    let cluster = Cluster::plain();
    let result = cluster
        .executor()
        .execute(
            &["worker"],
            Operation::parse("interactive-shell", words(&["bash"])).unwrap(),
        )
        .await;

    assert!(matches!(result, Err(ExecutorError::Validation(_))));
    assert_eq!(cluster.connects(), 0);
}

#[tokio::test]
async fn test_copy_destination_needs_trailing_slash() {
    let cluster = Cluster::plain();
    let executor = cluster.executor();

    for helper in ["copy-from-day0", "copy-to-day0"] {
        let result = executor
            .execute(
                &["worker"],
                Operation::parse(helper, words(&["/opt/ep/data", "/srv/data"])).unwrap(),
            )
            .await;
        assert!(matches!(result, Err(ExecutorError::Validation(_))), "{}", helper);
    }
    assert_eq!(cluster.connects(), 0);
}

#[tokio::test]
async fn test_copy_from_day0_streams_to_every_target() {
    let payload = vec![7u8; 200 * 1024];
    let cluster = Cluster::new(
        MockTransport::new("10.0.0.1").with_output(&payload),
        MockTransport::new("10.0.0.2"),
        MockTransport::new("10.0.0.3"),
    );
    let executor = cluster.executor().with_bridge_capacity(1024);

    executor
        .execute(
            &["worker"],
            Operation::CopyFromDay0(words(&["/opt/ep/data", "/srv/{{ip}}/"])),
        )
        .await
        .unwrap();

    let producer_runs = cluster.day0.runs();
    assert_eq!(producer_runs.len(), 2);
    for run in &producer_runs {
        assert_eq!(run.command, words(&["tar", "-c", "-C", "/opt/ep", "data"]));
        assert!(run.stdin.is_none());
    }

    for (mock, ip) in [(&cluster.w1, "10.0.0.2"), (&cluster.w2, "10.0.0.3")] {
        let runs = mock.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(
            runs[0].command,
            words(&["tar", "-x", "-C", &format!("/srv/{}/", ip)])
        );
        assert_eq!(runs[0].stdin.as_deref(), Some(payload.as_slice()));
        assert_eq!(mock.connects(), 1);
        assert_eq!(mock.disconnects(), 1);
    }

    // The bootstrap connection is shared by every pair
    assert_eq!(cluster.day0.connects(), 1);
    assert_eq!(cluster.day0.disconnects(), 1);
}

#[tokio::test]
async fn test_copy_to_day0_collects_from_every_target() {
    let cluster = Cluster::new(
        MockTransport::new("10.0.0.1"),
        MockTransport::new("10.0.0.2").with_output(b"archive of 10.0.0.2"),
        MockTransport::new("10.0.0.3").with_output(b"archive of 10.0.0.3"),
    );

    cluster
        .executor()
        .execute(
            &["worker"],
            Operation::CopyToDay0(words(&["/var/log/ep", "/backup/{{ip}}/"])),
        )
        .await
        .unwrap();

    let mut received: Vec<(Vec<String>, Vec<u8>)> = cluster
        .day0
        .runs()
        .into_iter()
        .map(|run| (run.command, run.stdin.unwrap_or_default()))
        .collect();
    received.sort();

    assert_eq!(
        received,
        vec![
            (
                words(&["tar", "-x", "-C", "/backup/10.0.0.2/"]),
                b"archive of 10.0.0.2".to_vec()
            ),
            (
                words(&["tar", "-x", "-C", "/backup/10.0.0.3/"]),
                b"archive of 10.0.0.3".to_vec()
            ),
        ]
    );
    assert_eq!(
        cluster.w1.runs()[0].command,
        words(&["tar", "-c", "-C", "/var/log", "ep"])
    );
    assert_eq!(cluster.day0.connects(), 1);
}

#[tokio::test]
async fn test_copy_to_bootstrap_itself_connects_once() {
    let cluster = Cluster::new(
        MockTransport::new("10.0.0.1").with_output(b"data"),
        MockTransport::new("10.0.0.2"),
        MockTransport::new("10.0.0.3"),
    );

    cluster
        .executor()
        .execute(
            &["day-0", "worker"],
            Operation::CopyFromDay0(words(&["/opt/data", "/srv/"])),
        )
        .await
        .unwrap();

    // Producer for all three pairs plus consumer for its own pair
    assert_eq!(cluster.day0.runs().len(), 4);
    assert_eq!(cluster.day0.connects(), 1);
    assert_eq!(cluster.day0.disconnects(), 1);
}

#[tokio::test]
async fn test_failing_producer_ends_consumer_input() {
    let cluster = Cluster::new(
        MockTransport::new("10.0.0.1").failing(),
        MockTransport::new("10.0.0.2"),
        MockTransport::new("10.0.0.3"),
    );

    let err = cluster
        .executor()
        .execute(&["worker"], Operation::CopyFromDay0(words(&["/opt/data", "/srv/"])))
        .await
        .unwrap_err();

    assert_eq!(err.failed_nodes(), vec!["10.0.0.1", "10.0.0.1"]);
    for mock in [&cluster.w1, &cluster.w2] {
        assert_eq!(mock.runs()[0].stdin.as_deref(), Some(&[][..]));
        assert_eq!(mock.disconnects(), 1);
    }
    assert_eq!(cluster.day0.disconnects(), 1);
}

#[tokio::test]
async fn test_push_image_off_day0_fails_before_auth() {
    let cluster = Cluster::plain();
    let registry = Arc::new(MockRegistry::default());
    let executor = cluster
        .executor()
        .with_registry(registry_settings())
        .with_registry_client(Arc::clone(&registry) as Arc<dyn RegistryClient>);

    let result = executor
        .execute(
            &["day-0", "worker"],
            Operation::PushImage(words(&["nginx:1.25"])),
        )
        .await;

    assert!(matches!(
        result,
        Err(ExecutorError::DayZeroOnly { operation: "push-image", .. })
    ));
    assert!(registry.calls().is_empty());
    assert_eq!(cluster.connects(), 0);
}

#[tokio::test]
async fn test_push_image_on_day0() {
    let cluster = Cluster::plain();
    let registry = Arc::new(MockRegistry::default());
    let executor = cluster
        .executor()
        .with_registry(registry_settings())
        .with_registry_client(Arc::clone(&registry) as Arc<dyn RegistryClient>);

    executor
        .execute(
            &["day-0"],
            Operation::PushImage(words(&["nginx:1.25", "busybox:latest"])),
        )
        .await
        .unwrap();

    assert_eq!(
        registry.calls(),
        words(&[
            "auth 10.0.0.1:9000",
            "map nginx:1.25,busybox:latest",
            "retag library/nginx:1.25",
            "push 10.0.0.1:9000/library/nginx:1.25",
            "retag library/busybox:latest",
            "push 10.0.0.1:9000/library/busybox:latest",
        ])
    );
}

#[tokio::test]
async fn test_push_file_validates_and_templates() {
    let cluster = Cluster::plain();
    let repository = Arc::new(MockRepository::default());
    let executor = cluster
        .executor()
        .with_repository_client(Arc::clone(&repository) as Arc<dyn RepositoryClient>);

    let short = executor
        .execute(&["day-0"], Operation::PushFile(words(&["/tmp/a.tgz", "bundle"])))
        .await;
    assert!(matches!(short, Err(ExecutorError::Validation(_))));

    let off_day0 = executor
        .execute(
            &["worker"],
            Operation::PushFile(words(&["/tmp/a.tgz", "bundle", "1.0.0"])),
        )
        .await;
    assert!(matches!(off_day0, Err(ExecutorError::DayZeroOnly { .. })));

    executor
        .execute(
            &["day-0"],
            Operation::PushFile(words(&["/tmp/{{ip}}.tgz", "bundle", "1.0.0"])),
        )
        .await
        .unwrap();
    executor
        .execute(
            &["day-0"],
            Operation::PushFile(words(&["/tmp/b.tgz", "bundle", ""])),
        )
        .await
        .unwrap();

    assert_eq!(
        repository.pushed.lock().unwrap().clone(),
        vec![
            (
                "/tmp/10.0.0.1.tgz".to_string(),
                "bundle".to_string(),
                "1.0.0".to_string()
            ),
            (
                "/tmp/b.tgz".to_string(),
                "bundle".to_string(),
                "0.0.0".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn test_pull_file_defaults_revision() {
    let cluster = Cluster::plain();
    let repository = Arc::new(MockRepository::default());
    let executor = cluster
        .executor()
        .with_registry(registry_settings())
        .with_repository_client(Arc::clone(&repository) as Arc<dyn RepositoryClient>);

    executor
        .execute(
            &["day-0"],
            Operation::PullFile(words(&["/opt/charts/", "charts/ingress", ""])),
        )
        .await
        .unwrap();

    assert_eq!(
        repository.pulled.lock().unwrap().clone(),
        vec![(
            "/opt/charts/".to_string(),
            "oci://10.0.0.1:9000/intel_ek/charts/ingress:0.0.0".to_string()
        )]
    );
}

#[tokio::test]
async fn test_create_registry_projects_needs_settings() {
    let cluster = Cluster::plain();
    let registry = Arc::new(MockRegistry::default());
    let executor = cluster
        .executor()
        .with_registry_client(Arc::clone(&registry) as Arc<dyn RegistryClient>);

    let result = executor
        .execute(
            &[],
            Operation::CreateRegistryProjects(words(&["edge/app:1.0"])),
        )
        .await;
    assert!(matches!(result, Err(ExecutorError::Validation(_))));
    assert!(registry.calls().is_empty());

    let executor = executor.with_registry(registry_settings());
    for _ in 0..2 {
        executor
            .execute(
                &[],
                Operation::CreateRegistryProjects(words(&["edge/app:1.0"])),
            )
            .await
            .unwrap();
    }
    assert_eq!(registry.calls(), words(&["map edge/app:1.0", "map edge/app:1.0"]));
}

#[tokio::test]
async fn test_executor_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("executor.toml");
    std::fs::write(
        &path,
        r#"
bridge_capacity = 4096

[[nodes]]
ip = "10.0.0.1"
roles = ["day-0"]

[registry]
provider_ip = "10.0.0.1"
registry_port = 9000
user = "admin"
password = "secret"
project = "edge"
"#,
    )
    .unwrap();

    let config: ExecutorConfig = config::load_config(&path).unwrap();
    config.validate().unwrap();

    let day0 = Arc::new(MockTransport::new("10.0.0.1"));
    let repository = Arc::new(MockRepository::default());
    let executor = Executor::from_config(topology(&[(&day0, &["day-0"])]), &config)
        .with_repository_client(Arc::clone(&repository) as Arc<dyn RepositoryClient>);

    executor
        .execute(
            &["day-0"],
            Operation::PullFile(words(&["/opt/", "bundle", "2.0.0"])),
        )
        .await
        .unwrap();

    assert_eq!(
        repository.pulled.lock().unwrap()[0].1,
        "oci://10.0.0.1:9000/edge/bundle:2.0.0"
    );
}
