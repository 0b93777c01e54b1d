use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use stackmate::backend::*;
use stackmate::cloud::{CloudClient, CloudError, DirectoryCloud, InvokeOutput};
use stackmate::config::RuntimeConfig;
use stackmate::deploy::archive::hash_bytes;
use stackmate::deploy::*;
use stackmate::invoke::InvokeError;
use stackmate::models::*;
use stackmate::store::ProjectStore;

// ============================================================
// Fakes
// ============================================================

/// Copies `main.rs` to the artifact; a `broken` marker file fails the build.
struct CopyBuilder;

#[async_trait]
impl ArtifactBuilder for CopyBuilder {
    async fn build(&self, _name: &str, dir: &Path) -> Result<BuiltArtifact, BuildError> {
        if dir.join("broken").exists() {
            return Err(BuildError::Failed {
                status: "exit status: 101".to_string(),
                stderr: "error[E0425]: cannot find value".to_string(),
            });
        }
        let source = std::fs::read(dir.join("main.rs")).expect("Failed to read source");
        let path = dir.join("bootstrap");
        std::fs::write(&path, &source).expect("Failed to write artifact");
        Ok(BuiltArtifact {
            path,
            hash: hash_bytes(&source),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BackendCall {
    Provision(ProvisionRequest),
    Update(UpdateRequest),
    Destroy(DestroyRequest),
}

#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
    fail: bool,
}

impl RecordingBackend {
    fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().expect("poisoned").clone()
    }

    fn respond(&self, stage: &str, sites: &[SiteSpec]) -> Result<ApplyResponse, InvokeError> {
        if self.fail {
            return Err(InvokeError::Backend("stack rollback".to_string()));
        }
        Ok(ApplyResponse {
            rest_endpoint: Some(format!("https://api.example.com/{}", stage)),
            ws_endpoint: Some(format!("wss://ws.example.com/{}", stage)),
            public_bucket: Some("shop-public".to_string()),
            sites: sites
                .iter()
                .map(|s| SiteStatus {
                    name: s.name.clone(),
                    bucket: format!("{}-bucket", s.name),
                })
                .collect(),
        })
    }
}

#[async_trait]
impl StageBackend for RecordingBackend {
    async fn provision(&self, req: &ProvisionRequest) -> Result<ApplyResponse, InvokeError> {
        self.calls.lock().expect("poisoned").push(BackendCall::Provision(req.clone()));
        self.respond(&req.stage, &req.public)
    }

    async fn update(&self, req: &UpdateRequest) -> Result<ApplyResponse, InvokeError> {
        self.calls.lock().expect("poisoned").push(BackendCall::Update(req.clone()));
        self.respond(&req.stage, &[])
    }

    async fn destroy(&self, req: &DestroyRequest) -> Result<(), InvokeError> {
        self.calls.lock().expect("poisoned").push(BackendCall::Destroy(req.clone()));
        if self.fail {
            return Err(InvokeError::Backend("stack in use".to_string()));
        }
        Ok(())
    }
}

struct FailingCloud;

#[async_trait]
impl CloudClient for FailingCloud {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        _body: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), CloudError> {
        Err(CloudError::PutObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: "access denied".to_string(),
        })
    }

    async fn invoke_function(
        &self,
        _function: &str,
        _payload: Vec<u8>,
        _context: BTreeMap<String, String>,
    ) -> Result<InvokeOutput, CloudError> {
        Err(CloudError::Unsupported("invoke"))
    }
}

/// Stores artifacts but refuses every other bucket.
struct ArtifactsOnlyCloud(DirectoryCloud);

#[async_trait]
impl CloudClient for ArtifactsOnlyCloud {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), CloudError> {
        if bucket != "artifacts" {
            return Err(CloudError::PutObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "denied".to_string(),
            });
        }
        self.0.put_object(bucket, key, body, content_type).await
    }

    async fn invoke_function(
        &self,
        function: &str,
        payload: Vec<u8>,
        context: BTreeMap<String, String>,
    ) -> Result<InvokeOutput, CloudError> {
        self.0.invoke_function(function, payload, context).await
    }
}

// ============================================================
// Fixture
// ============================================================

struct Fixture {
    _root: TempDir,
    _objects: TempDir,
    root: PathBuf,
    config: RuntimeConfig,
    workspace: Workspace,
    store: ProjectStore,
    project: Project,
    cloud: DirectoryCloud,
}

impl Fixture {
    fn new() -> Self {
        let root_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let objects_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = root_dir.path().to_path_buf();

        let mut workspace = Workspace::new("default");
        workspace
            .add_node(NewNode {
                name: "local".to_string(),
                account_id: "123456789012".to_string(),
                region: "eu-west-1".to_string(),
                bucket: "artifacts".to_string(),
                endpoint: "http://127.0.0.1:9".to_string(),
            })
            .expect("Failed to add node");

        let mut project = Project::new("shop").expect("Failed to create project");
        project.add_stage("dev", "local").expect("Failed to add stage");
        project.wire_up(&workspace);
        let store = ProjectStore::new(&root);
        store.save(&project).expect("Failed to save project");

        let fixture = Self {
            cloud: DirectoryCloud::new(objects_dir.path()),
            _root: root_dir,
            _objects: objects_dir,
            root,
            config: RuntimeConfig::default(),
            workspace,
            store,
            project,
        };
        fixture.write_function("ping", "fn main() { ping() }");
        fixture.write_function("pong", "fn main() { pong() }");
        fixture.write_site("www", "index.html", "<h1>shop</h1>");
        fixture
    }

    fn write_function(&self, name: &str, source: &str) {
        let dir = self.root.join(FUNCTIONS_DIR).join(name);
        std::fs::create_dir_all(&dir).expect("Failed to create function dir");
        std::fs::write(dir.join("main.rs"), source).expect("Failed to write source");
    }

    fn break_function(&self, name: &str) {
        std::fs::write(self.root.join(FUNCTIONS_DIR).join(name).join("broken"), "")
            .expect("Failed to write marker");
    }

    fn write_site(&self, name: &str, file: &str, content: &str) {
        let dir = self.root.join(PUBLIC_DIR).join(name);
        std::fs::create_dir_all(&dir).expect("Failed to create site dir");
        std::fs::write(dir.join(file), content).expect("Failed to write site file");
    }

    async fn deploy_with(
        &mut self,
        cloud: &dyn CloudClient,
        backend: &dyn StageBackend,
    ) -> Result<DeployOutcome, DeployError> {
        Deploy::new(
            &self.config,
            &self.store,
            &mut self.project,
            None,
            &CopyBuilder,
            cloud,
            backend,
        )
        .run()
        .await
    }

    async fn deploy(&mut self, backend: &dyn StageBackend) -> Result<DeployOutcome, DeployError> {
        let cloud = self.cloud.clone();
        self.deploy_with(&cloud, backend).await
    }

    fn reload(&self) -> Project {
        self.store.load(&self.workspace).expect("Failed to reload project")
    }

    fn object(&self, bucket: &str, key: &str) -> PathBuf {
        self.cloud.object_path(bucket, key)
    }
}

fn provisioned(call: &BackendCall) -> &ProvisionRequest {
    match call {
        BackendCall::Provision(req) => req,
        other => panic!("expected provision, got {:?}", other),
    }
}

// ============================================================
// Specs
// ============================================================

mod first_deploy {
    use super::*;

    #[tokio::test]
    async fn provisions_the_full_topology() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();

        let outcome = fx.deploy(&backend).await.expect("Deploy failed");

        assert!(!outcome.nothing_to_deploy);
        assert_eq!(outcome.stage, "dev");
        assert_eq!(outcome.diff.functions.added, vec!["ping", "pong"]);
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        let req = provisioned(&calls[0]);
        assert_eq!(req.functions.len(), 2);
        assert_eq!(req.public.len(), 1);
        assert_eq!(req.bucket, "artifacts");
        assert_eq!(req.tags.get("stackmate:project").map(String::as_str), Some("shop"));
    }

    #[tokio::test]
    async fn uploads_zipped_artifacts_under_their_storage_key() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();

        let outcome = fx.deploy(&backend).await.expect("Deploy failed");

        let hash = hash_bytes(b"fn main() { ping() }");
        let key = format!("functions/shop/dev/ping-{}.zip", hash);
        let bytes = std::fs::read(fx.object("artifacts", &key)).expect("Artifact not uploaded");
        assert_eq!(&bytes[..2], b"PK");
        assert!(outcome.timings.upload_bytes > 0);
    }

    #[tokio::test]
    async fn persists_endpoints_and_buckets() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();

        fx.deploy(&backend).await.expect("Deploy failed");

        let reloaded = fx.reload();
        let stage = reloaded.stage("dev").expect("missing stage");
        assert_eq!(stage.rest_endpoint(), Some("https://api.example.com/dev"));
        assert_eq!(stage.public_bucket.as_deref(), Some("shop-public"));
        assert_eq!(stage.site("www").and_then(|s| s.bucket.as_deref()), Some("www-bucket"));
        assert!(stage.last_deployment.is_some());
        assert_eq!(
            stage.function("ping").map(|f| f.hash().to_string()),
            Some(hash_bytes(b"fn main() { ping() }"))
        );
        assert_eq!(&reloaded.stages, &fx.project.stages);
    }

    #[tokio::test]
    async fn syncs_public_sites_to_the_reported_bucket() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();

        let outcome = fx.deploy(&backend).await.expect("Deploy failed");

        let content = std::fs::read_to_string(fx.object("www-bucket", "www/index.html"))
            .expect("Site file not uploaded");
        assert_eq!(content, "<h1>shop</h1>");
        assert_eq!(outcome.timings.synced_files, 1);
        assert_eq!(outcome.timings.sync_bytes, "<h1>shop</h1>".len() as u64);
    }
}

mod incremental_deploys {
    use super::*;

    #[tokio::test]
    async fn reports_nothing_to_deploy_when_unchanged() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();
        fx.deploy(&backend).await.expect("Deploy failed");

        let outcome = fx.deploy(&backend).await.expect("Deploy failed");

        assert!(outcome.nothing_to_deploy);
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn updates_only_changed_function_code() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();
        fx.deploy(&backend).await.expect("Deploy failed");

        fx.write_function("ping", "fn main() { ping_v2() }");
        let outcome = fx.deploy(&backend).await.expect("Deploy failed");

        assert_eq!(outcome.diff.updated_functions(), ["ping".to_string()]);
        match &backend.calls()[1] {
            BackendCall::Update(req) => {
                assert_eq!(req.functions.len(), 1);
                assert_eq!(req.functions[0].name, "ping");
                assert!(req.functions[0].resource_name.starts_with("shop-dev-ping-"));
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn provisions_again_when_a_function_is_removed() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();
        fx.deploy(&backend).await.expect("Deploy failed");

        std::fs::remove_dir_all(fx.root.join(FUNCTIONS_DIR).join("pong")).expect("Failed to remove");
        let outcome = fx.deploy(&backend).await.expect("Deploy failed");

        assert_eq!(outcome.diff.functions.removed, vec!["pong"]);
        let calls = backend.calls();
        assert_eq!(provisioned(&calls[1]).functions.len(), 1);
        assert!(fx.reload().stage("dev").expect("missing").function("pong").is_none());
    }

    #[tokio::test]
    async fn skips_the_backend_when_only_a_site_changed() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();
        fx.deploy(&backend).await.expect("Deploy failed");

        fx.write_site("www", "about.html", "<p>about</p>");
        let outcome = fx.deploy(&backend).await.expect("Deploy failed");

        assert!(!outcome.nothing_to_deploy);
        assert_eq!(backend.calls().len(), 1);
        assert!(fx.object("www-bucket", "www/about.html").exists());
        assert_eq!(outcome.timings.synced_files, 2);
    }
}

mod build_failures {
    use super::*;

    #[tokio::test]
    async fn skip_the_failed_function_and_continue() {
        let mut fx = Fixture::new();
        fx.break_function("pong");
        let backend = RecordingBackend::default();

        let outcome = fx.deploy(&backend).await.expect("Deploy failed");

        assert_eq!(outcome.failed_builds.len(), 1);
        assert_eq!(outcome.failed_builds[0].name, "pong");
        assert!(outcome.failed_builds[0].error.contains("E0425"));
        let calls = backend.calls();
        let names: Vec<&str> = provisioned(&calls[0])
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["ping"]);
    }

    #[tokio::test]
    async fn keep_a_previously_deployed_function() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();
        fx.deploy(&backend).await.expect("Deploy failed");
        let before = fx.project.stage("dev").expect("missing").function("pong").cloned();

        fx.write_function("pong", "fn main() { pong_v2() }");
        fx.break_function("pong");
        let outcome = fx.deploy(&backend).await.expect("Deploy failed");

        assert!(outcome.nothing_to_deploy);
        assert_eq!(fx.project.stage("dev").expect("missing").function("pong").cloned(), before);
    }
}

mod fatal_failures {
    use super::*;

    #[tokio::test]
    async fn upload_failure_aborts_before_the_backend_call() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();

        let err = fx.deploy_with(&FailingCloud, &backend).await.unwrap_err();

        assert!(matches!(err, DeployError::Upload { .. }));
        assert!(backend.calls().is_empty());
        assert!(fx.reload().stage("dev").expect("missing").functions.is_empty());
        assert!(fx.project.stage("dev").expect("missing").functions.is_empty());
    }

    #[tokio::test]
    async fn backend_failure_leaves_state_untouched() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::failing();

        let err = fx.deploy(&backend).await.unwrap_err();

        assert!(matches!(err, DeployError::Apply(_)));
        assert!(err.to_string().contains("stack rollback"));
        let stage = fx.reload().stage("dev").cloned().expect("missing");
        assert!(stage.functions.is_empty());
        assert!(stage.last_deployment.is_none());
    }

    #[tokio::test]
    async fn site_sync_failure_is_retried_by_the_next_deploy() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();
        let denied = ArtifactsOnlyCloud(fx.cloud.clone());

        let err = fx.deploy_with(&denied, &backend).await.unwrap_err();

        assert!(matches!(err, DeployError::SiteSync { ref site, .. } if site == "www"));
        assert!(!fx.object("www-bucket", "www/index.html").exists());
        let stage = fx.reload().stage("dev").cloned().expect("missing");
        assert_eq!(stage.functions.len(), 2);
        assert_eq!(stage.site("www").map(|s| s.hash.as_str()), Some(""));

        let outcome = fx.deploy(&backend).await.expect("Deploy failed");

        assert!(!outcome.nothing_to_deploy);
        assert_eq!(outcome.diff.updated_public_sites(), ["www".to_string()]);
        assert_eq!(backend.calls().len(), 1);
        assert!(fx.object("www-bucket", "www/index.html").exists());
    }

    #[tokio::test]
    async fn site_sync_failure_keeps_the_previous_site_hash() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();
        fx.deploy(&backend).await.expect("Deploy failed");
        let before = fx.project.stage("dev").expect("missing").site("www").cloned();

        fx.write_site("www", "index.html", "<h1>shop v2</h1>");
        let denied = ArtifactsOnlyCloud(fx.cloud.clone());
        let err = fx.deploy_with(&denied, &backend).await.unwrap_err();

        assert!(matches!(err, DeployError::SiteSync { .. }));
        assert_eq!(fx.reload().stage("dev").expect("missing").site("www").cloned(), before);
        assert_eq!(fx.project.stage("dev").expect("missing").site("www").cloned(), before);

        fx.deploy(&backend).await.expect("Deploy failed");
        let content = std::fs::read_to_string(fx.object("www-bucket", "www/index.html"))
            .expect("Site file not uploaded");
        assert_eq!(content, "<h1>shop v2</h1>");
    }

    #[tokio::test]
    async fn invalid_function_names_fail_the_deploy() {
        let mut fx = Fixture::new();
        fx.write_function("api", "fn main() {}");
        let backend = RecordingBackend::default();

        let err = fx.deploy(&backend).await.unwrap_err();

        assert!(matches!(err, DeployError::Reconcile(_)));
        assert!(backend.calls().is_empty());
    }
}

mod stage_lifecycle {
    use super::*;

    #[tokio::test]
    async fn new_stage_is_persisted_and_wired() {
        let mut fx = Fixture::new();

        new_stage(&fx.store, &mut fx.project, &fx.workspace, "prod", None).expect("Failed to create stage");

        let reloaded = fx.reload();
        let prod = reloaded.stage("prod").expect("missing stage");
        assert!(!prod.default);
        assert_eq!(prod.node_ref().expect("unwired").name, "local");
        assert!(fx.project.stage("prod").is_some());
    }

    #[tokio::test]
    async fn new_stage_rejects_unknown_nodes() {
        let mut fx = Fixture::new();
        let err = new_stage(&fx.store, &mut fx.project, &fx.workspace, "prod", Some("mars")).unwrap_err();
        assert!(matches!(err, DeployError::Model(ModelError::NotFound { .. })));
        assert!(fx.reload().stage("prod").is_none());
    }

    #[tokio::test]
    async fn destroy_tears_down_then_forgets_the_stage() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();
        fx.deploy(&backend).await.expect("Deploy failed");

        destroy_stage(&fx.store, &mut fx.project, "dev", &backend)
            .await
            .expect("Failed to destroy stage");

        let calls = backend.calls();
        match calls.last() {
            Some(BackendCall::Destroy(req)) => {
                assert_eq!(req.project, "shop");
                assert_eq!(req.stage, "dev");
            }
            other => panic!("expected destroy, got {:?}", other),
        }
        assert!(fx.reload().stages.is_empty());
    }

    #[tokio::test]
    async fn destroy_failure_keeps_the_stage() {
        let mut fx = Fixture::new();
        fx.deploy(&RecordingBackend::default()).await.expect("Deploy failed");

        let err = destroy_stage(&fx.store, &mut fx.project, "dev", &RecordingBackend::failing())
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Destroy(_)));
        assert!(fx.reload().stage("dev").is_some());
    }
}
