//! Integration tests against a live etcd-compatible endpoint.
//!
//! Run with a store at 127.0.0.1:2379:
//! `cargo test -p libcatalog -- --ignored`

use serial_test::serial;

use common::Arch;
use common::arch::Os;
use common::images::{ImageVariant, ImagesList, MultiArchImages, UnavailableImages};
use common::PodTask;
use libcatalog::{Catalog, CatalogConfig, CatalogStore};

const ENDPOINT: &str = "127.0.0.1:2379";

async fn test_store() -> CatalogStore {
    let cfg = CatalogConfig::new(vec![ENDPOINT.to_string()]);
    CatalogStore::connect(&cfg).await.expect("store reachable")
}

fn sample_images() -> ImagesList {
    ImagesList {
        list: vec![MultiArchImages {
            name: "it-nginx".to_string(),
            images: vec![
                ImageVariant {
                    name: "it-nginx".to_string(),
                    arch: Arch::Amd64,
                    os: Os::Linux,
                },
                ImageVariant {
                    name: "it-nginx-arm64".to_string(),
                    arch: Arch::Arm64,
                    os: Os::Linux,
                },
            ],
        }],
    }
}

#[tokio::test]
#[serial]
#[ignore = "needs a live store"]
async fn images_replace_and_append_round_trip() {
    let store = test_store().await;
    store.replace_images(&sample_images()).await.unwrap();

    let snapshot = store.images_snapshot().await.unwrap();
    let decoded = ImagesList::decode(&snapshot).unwrap();
    assert_eq!(decoded.variants_of("it-nginx").unwrap().len(), 2);

    let additions = ImagesList {
        list: vec![MultiArchImages {
            name: "it-redis".to_string(),
            images: vec![ImageVariant {
                name: "it-redis".to_string(),
                arch: Arch::Amd64,
                os: Os::Linux,
            }],
        }],
    };
    store.append_images(&additions).await.unwrap();
    let snapshot = store.images_snapshot().await.unwrap();
    let decoded = ImagesList::decode(&snapshot).unwrap();
    assert!(decoded.variants_of("it-nginx").is_some());
    assert!(decoded.variants_of("it-redis").is_some());

    store.replace_images(&ImagesList::default()).await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "needs a live store"]
async fn unavailable_set_is_a_set() {
    let store = test_store().await;
    store
        .put_unavailable(&UnavailableImages::default())
        .await
        .unwrap();

    store
        .mark_unavailable(&["it-foo".to_string()])
        .await
        .unwrap();
    store
        .mark_unavailable(&["it-foo".to_string(), "it-bar".to_string()])
        .await
        .unwrap();

    let set = store.get_unavailable().await.unwrap();
    assert_eq!(set.images, vec!["it-foo".to_string(), "it-bar".to_string()]);

    store
        .put_unavailable(&UnavailableImages::default())
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "needs a live store"]
async fn pod_write_read_round_trip() {
    let store = test_store().await;
    let pod: PodTask = serde_yaml::from_str(
        r#"
apiVersion: v1
kind: Pod
metadata:
  name: it-web
  namespace: it-tests
spec:
  schedulerName: rhice-scheduler
  containers:
  - name: main
    image: it-nginx
"#,
    )
    .unwrap();
    store.put_pod(&pod).await.unwrap();
    let read_back = store.get_pod("it-tests", "it-web").await.unwrap().unwrap();
    assert_eq!(read_back, pod);
    assert!(store.get_pod("it-tests", "missing").await.unwrap().is_none());
}
