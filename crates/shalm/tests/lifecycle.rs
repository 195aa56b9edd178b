//! Apply/delete cascades against the recording cluster client

use indexmap::IndexMap;
use shalm::backends::UserCredential;
use shalm::{
    Args, Builtin, Chart, Jewel, JewelBackend, JewelState, K8sValue, Result, ShalmError,
};
use shalm_kube::{K8s, K8sVault, MockK8s, MockOperation, OperationKind, SecretData, Vault};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Backend generating `pwd` and counting its calls
#[derive(Default)]
struct PasswordBackend {
    applies: AtomicUsize,
}

impl JewelBackend for PasswordBackend {
    fn name(&self) -> &str {
        "password"
    }

    fn keys(&self) -> IndexMap<String, String> {
        IndexMap::from([("password".to_string(), "pwd".to_string())])
    }

    fn apply(&self, existing: &SecretData) -> Result<SecretData> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        let mut data = existing.clone();
        data.entry("pwd".to_string())
            .or_insert_with(|| b"s3cret".to_vec());
        Ok(data)
    }
}

struct BrokenBackend;

impl JewelBackend for BrokenBackend {
    fn name(&self) -> &str {
        "broken"
    }

    fn keys(&self) -> IndexMap<String, String> {
        IndexMap::from([("token".to_string(), "token".to_string())])
    }

    fn apply(&self, _existing: &SecretData) -> Result<SecretData> {
        Err(ShalmError::Backend {
            backend: "broken".to_string(),
            message: "upstream unavailable".to_string(),
        })
    }
}

fn config_map(name: &str, data: &str) -> String {
    format!(
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\ndata:\n{}\n",
        name, data
    )
}

fn apply_refs(refs: &[&str]) -> MockOperation {
    MockOperation::Apply(refs.iter().map(|s| s.to_string()).collect())
}

fn delete_refs(refs: &[&str]) -> MockOperation {
    MockOperation::Delete(refs.iter().map(|s| s.to_string()).collect())
}

/// `app` in namespace `prod` with sub-chart `db` and jewel `app-secret`
fn app_chart(backend: Arc<dyn JewelBackend>) -> (Arc<Chart>, Arc<Jewel>) {
    let db = Chart::builder("db")
        .namespace("prod")
        .template("cm.yaml", config_map("db-config", "  port: \"5432\""))
        .build()
        .unwrap();
    let jewel = Arc::new(Jewel::new(backend, "app-secret"));
    let app = Chart::builder("app")
        .namespace("prod")
        .value("db", db)
        .value("secret", jewel.clone())
        .template("a.yaml", config_map("a", "  pwd: \"{{ values.secret.password }}\""))
        .template("b.yaml", config_map("b", "  pwd: \"{{ values.secret.password }}\""))
        .build()
        .unwrap();
    (app, jewel)
}

fn config_value(k8s: &MockK8s, name: &str, key: &str) -> Option<String> {
    k8s.object("configmap", "prod", name)?
        .data
        .get("data")?
        .get(key)?
        .as_str()
        .map(str::to_string)
}

#[tokio::test]
async fn test_apply_runs_sub_charts_first_and_generates_once() {
    let k8s = MockK8s::new();
    let backend = Arc::new(PasswordBackend::default());
    let (app, jewel) = app_chart(backend.clone());

    app.apply(Arc::new(k8s.clone())).await.unwrap();

    assert_eq!(
        k8s.operations(),
        vec![
            apply_refs(&["ConfigMap/db-config"]),
            MockOperation::Get("secret/app-secret".to_string()),
            apply_refs(&["Secret/app-secret"]),
            apply_refs(&["ConfigMap/a", "ConfigMap/b"]),
            MockOperation::Progress(100),
        ]
    );
    assert_eq!(backend.applies.load(Ordering::SeqCst), 1);
    assert_eq!(jewel.state(), JewelState::Ready);
    assert_eq!(config_value(&k8s, "a", "pwd").as_deref(), Some("s3cret"));
    assert_eq!(config_value(&k8s, "b", "pwd").as_deref(), Some("s3cret"));
    assert!(k8s.object("secret", "prod", "app-secret").is_some());
}

#[tokio::test]
async fn test_delete_removes_manifests_then_secret_then_sub_charts() {
    let k8s = MockK8s::new();
    let (app, _jewel) = app_chart(Arc::new(PasswordBackend::default()));
    app.apply(Arc::new(k8s.clone())).await.unwrap();
    k8s.reset_operations();

    app.delete(Arc::new(k8s.clone())).await.unwrap();

    assert_eq!(
        k8s.operations(),
        vec![
            delete_refs(&["ConfigMap/a", "ConfigMap/b"]),
            delete_refs(&["Secret/app-secret"]),
            delete_refs(&["ConfigMap/db-config"]),
            MockOperation::Progress(100),
        ]
    );
    assert_eq!(k8s.object_count(), 0);
}

#[tokio::test]
async fn test_delete_does_not_generate_secrets() {
    let k8s = MockK8s::new();
    let (installed, _) = app_chart(Arc::new(PasswordBackend::default()));
    installed.apply(Arc::new(k8s.clone())).await.unwrap();

    let backend = Arc::new(PasswordBackend::default());
    let (app, jewel) = app_chart(backend.clone());
    app.delete(Arc::new(k8s.clone())).await.unwrap();

    assert_eq!(backend.applies.load(Ordering::SeqCst), 0);
    assert_eq!(jewel.state(), JewelState::Init);
    assert_eq!(k8s.object_count(), 0);
}

#[tokio::test]
async fn test_stored_credentials_are_reused() {
    let k8s = MockK8s::new();
    let credential = |chart_k8s: &MockK8s| {
        let jewel = Arc::new(Jewel::new(Arc::new(UserCredential::new()), "db-user"));
        let chart = Chart::builder("app")
            .namespace("prod")
            .value("user", jewel)
            .template(
                "cm.yaml",
                config_map("creds", "  password: \"{{ values.user.password }}\""),
            )
            .build()
            .unwrap();
        (chart, Arc::new(chart_k8s.clone()) as Arc<dyn K8s>)
    };

    let (first, client) = credential(&k8s);
    first.apply(client).await.unwrap();
    let generated = config_value(&k8s, "creds", "password").unwrap();
    assert_eq!(generated.len(), 16);

    let (second, client) = credential(&k8s);
    second.apply(client).await.unwrap();
    assert_eq!(config_value(&k8s, "creds", "password"), Some(generated));
}

#[tokio::test]
async fn test_sub_chart_failure_aborts_parent() {
    let k8s = MockK8s::new();
    k8s.fail_on(OperationKind::Apply, "quota exceeded");
    let (app, _jewel) = app_chart(Arc::new(PasswordBackend::default()));

    let err = app.apply(Arc::new(k8s.clone())).await.unwrap_err();

    assert_eq!(err.to_string(), "apply failed: quota exceeded");
    assert_eq!(k8s.operations(), vec![apply_refs(&["ConfigMap/db-config"])]);
}

#[tokio::test]
async fn test_backend_failure_aborts_before_manifests() {
    let k8s = MockK8s::new();
    let app = Chart::builder("app")
        .namespace("prod")
        .value("token", Arc::new(Jewel::new(Arc::new(BrokenBackend), "api-token")))
        .template("cm.yaml", config_map("c", "  static: \"yes\""))
        .build()
        .unwrap();

    let err = app.apply(Arc::new(k8s.clone())).await.unwrap_err();

    assert!(matches!(err, ShalmError::Backend { .. }));
    assert_eq!(err.to_string(), "broken: upstream unavailable");
    assert_eq!(
        k8s.operations(),
        vec![MockOperation::Get("secret/api-token".to_string())]
    );
}

#[tokio::test]
async fn test_unknown_attributes_are_named_errors() {
    let (app, jewel) = app_chart(Arc::new(PasswordBackend::default()));

    let err = app.attr("replicas").unwrap_err();
    assert_eq!(err.to_string(), "chart 'app' has no .replicas attribute");

    let err = jewel.attr("token").unwrap_err();
    assert_eq!(err.to_string(), "password has no .token attribute");

    let err = app
        .call_method("upgrade", Args::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "chart 'app' has no method 'upgrade'");
}

#[tokio::test]
async fn test_vault_round_trip() {
    let k8s: Arc<dyn K8s> = Arc::new(MockK8s::new());
    let vault = K8sVault::new(k8s, "prod");
    let data = SecretData::from([
        ("pwd".to_string(), b"s3cret".to_vec()),
        ("raw".to_string(), vec![0, 159, 146, 150]),
    ]);

    vault.write("app-secret", &data).await.unwrap();
    assert_eq!(vault.read("app-secret").await.unwrap(), data);
}

#[tokio::test]
async fn test_jewel_read_states() {
    let k8s: Arc<dyn K8s> = Arc::new(MockK8s::new());
    let vault = K8sVault::new(k8s, "prod");

    let absent = Jewel::new(Arc::new(PasswordBackend::default()), "absent");
    absent.read(&vault).await.unwrap();
    assert_eq!(absent.state(), JewelState::Init);

    let stored = SecretData::from([("pwd".to_string(), b"from-cluster".to_vec())]);
    vault.write("present", &stored).await.unwrap();
    let present = Jewel::new(Arc::new(PasswordBackend::default()), "present");
    present.read(&vault).await.unwrap();
    assert_eq!(present.state(), JewelState::Loaded);
    assert_eq!(present.data(), stored);
    assert_eq!(present.field("password").unwrap(), "from-cluster");
}

#[tokio::test]
async fn test_replaced_hook_applies_a_subset() {
    let k8s = MockK8s::new();
    let chart = Chart::builder("operator")
        .namespace("prod")
        .template("crds/crd.yaml", config_map("crd-like", "  a: \"1\""))
        .template("deploy.yaml", config_map("deploy", "  b: \"2\""))
        .build()
        .unwrap();

    let weak: Weak<Chart> = Arc::downgrade(&chart);
    chart.set_method(
        "apply",
        Arc::new(Builtin::new("apply", move |args: Args| {
            let chart = weak.upgrade();
            async move {
                let chart = chart.ok_or_else(|| ShalmError::ChartDropped("apply".to_string()))?;
                let k8s = args.client("apply", 0, "k8s")?;
                chart
                    .call_method(
                        "__apply",
                        Args::k8s(k8s)
                            .with_kwarg("glob", "crds/*")
                            .with_kwarg("ignore_not_found", true),
                    )
                    .await
            }
        })),
    );

    chart.apply(Arc::new(k8s.clone())).await.unwrap();

    assert_eq!(
        k8s.operations(),
        vec![apply_refs(&["ConfigMap/crd-like"]), MockOperation::Progress(100)]
    );
}

#[tokio::test]
async fn test_local_hooks_reject_unknown_options() {
    let k8s: Arc<dyn K8s> = Arc::new(MockK8s::new());
    let chart = Chart::builder("app").build().unwrap();

    let err = chart
        .call_method(
            "__apply",
            Args::k8s(K8sValue::new(k8s)).with_kwarg("replicas", 3i64),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ShalmError::InvalidArgument { .. }));
}
