mod common;

use common::{animated_config, texture, MockHost, MockSource, Reply};
use skinmotion::host::{HostServer, Location};
use skinmotion::model::{CapeType, SkinVariant, TextureProperty};
use skinmotion::sync::capes::CapeGenerator;
use skinmotion::sync::{ConnectionState, GeneratedTexture, SyncError, SyncResult};
use skinmotion::{Collaborators, ServiceError, Settings, SimLoop, SkinMotion};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;

fn service(host: &Arc<MockHost>, source: &Arc<MockSource>) -> (SkinMotion, SimLoop) {
    service_with_capes(host, source, None)
}

fn service_with_capes(
    host: &Arc<MockHost>,
    source: &Arc<MockSource>,
    capes: Option<Arc<dyn CapeGenerator>>,
) -> (SkinMotion, SimLoop) {
    let collaborators = Collaborators {
        source: source.clone(),
        storage: None,
        connector: None,
        capes,
    };
    let dyn_host: Arc<dyn HostServer> = host.clone();
    SkinMotion::build_with(Settings::default(), dyn_host, Handle::current(), collaborators)
}

/// Answers every request with `result` and records what was asked
struct StubGenerator {
    result: SyncResult<TextureProperty>,
    requests: Mutex<Vec<(String, CapeType, SkinVariant)>>,
}

impl StubGenerator {
    fn new(result: SyncResult<TextureProperty>) -> Arc<Self> {
        Arc::new(Self {
            result,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl CapeGenerator for StubGenerator {
    async fn generate(&self, skin_url: &str, cape: CapeType, variant: SkinVariant) -> SyncResult<GeneratedTexture> {
        self.requests.lock().unwrap().push((skin_url.to_string(), cape, variant));
        self.result.clone().map(|property| GeneratedTexture {
            property,
            texture_url: None,
            cached: false,
        })
    }
}

/// Tick until the subject receives a line starting with `prefix`
async fn tick_until_message(sim: &mut SimLoop, host: &MockHost, subject: uuid::Uuid, prefix: &str) {
    for _ in 0..200 {
        sim.tick();
        if host.messages_for(subject).iter().any(|m| m.starts_with(prefix)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("no message starting with {:?}: {:?}", prefix, host.messages_for(subject));
}

fn spawn_point() -> Location {
    Location::new("world", 10.0, 64.0, 10.0)
}

#[tokio::test]
async fn test_join_loads_remote_skin_and_applies_first_frame() {
    let host = Arc::new(MockHost::new());
    let source = Arc::new(MockSource::default());
    let (core, mut sim) = service(&host, &source);
    let subject = host.join("Alex", spawn_point(), &texture("https://textures.example/o", "o-sig"));
    let config = animated_config(subject.id, "Alex", 3, "join");
    source.set(subject.id, Reply::Config(config.clone()));

    core.on_subject_join(subject.id, "Alex");
    for _ in 0..100 {
        if core.engine().cache().contains(subject.id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
    sim.tick();

    let first = config.first_frame().and_then(|f| f.to_property());
    assert_eq!(host.textures_of(subject.id), first);
    assert_eq!(core.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_restore_drops_cached_config() {
    let host = Arc::new(MockHost::new());
    let source = Arc::new(MockSource::default());
    let (core, mut sim) = service(&host, &source);
    let original = texture("https://textures.example/o", "o-sig");
    let subject = host.join("Alex", spawn_point(), &original);
    core.engine()
        .cache()
        .replace(animated_config(subject.id, "Alex", 2, "cached"));

    core.apply_skin(subject.id, texture("https://textures.example/x", "x-sig"));
    sim.tick();
    assert_ne!(host.textures_of(subject.id), Some(original.clone()));

    core.restore_original_skin(subject.id);
    sim.tick();
    assert_eq!(host.textures_of(subject.id), Some(original));
    assert!(!core.engine().cache().contains(subject.id));
}

#[tokio::test]
async fn test_quit_removes_subject_from_synthetic_viewers() {
    let host = Arc::new(MockHost::new());
    let source = Arc::new(MockSource::default());
    let (core, mut sim) = service(&host, &source);
    let skin = texture("https://textures.example/v", "v-sig");
    let viewer = host.join("Viewer", spawn_point(), &skin);
    let other = host.join("Other", spawn_point(), &skin);

    let entity = core.create_synthetic(spawn_point(), skin).unwrap();
    entity.spawn(viewer.id).unwrap();
    entity.spawn(other.id).unwrap();
    assert_eq!(core.synthetic(entity.local_id()).map(|e| e.local_id()), Some(entity.local_id()));

    core.on_subject_quit(viewer.id);
    host.leave(viewer.id);
    sim.tick();

    assert!(!entity.is_viewer(viewer.id));
    assert!(entity.is_viewer(other.id));
}

#[tokio::test]
async fn test_removed_synthetic_is_despawned_for_everyone() {
    let host = Arc::new(MockHost::new());
    let source = Arc::new(MockSource::default());
    let (core, mut sim) = service(&host, &source);
    let skin = texture("https://textures.example/v", "v-sig");
    let viewer = host.join("Viewer", spawn_point(), &skin);

    let entity = core.create_synthetic(spawn_point(), skin).unwrap();
    entity.spawn(viewer.id).unwrap();
    assert!(core.remove_synthetic(entity.local_id()));
    assert!(!core.remove_synthetic(entity.local_id()));
    assert!(core.synthetic_entities().is_empty());

    sim.tick();
    assert_eq!(entity.viewer_count(), 0);
}

#[tokio::test]
async fn test_synthetic_unavailable_without_protocol() {
    let host = Arc::new(MockHost::new().without_protocol());
    let source = Arc::new(MockSource::default());
    let (core, _sim) = service(&host, &source);

    let result = core.create_synthetic(spawn_point(), texture("https://textures.example/v", "v-sig"));
    assert!(matches!(result, Err(ServiceError::SyntheticUnavailable { .. })));
    assert!(!core.protocol().is_available());
}

#[tokio::test]
async fn test_cape_requires_generation_backend() {
    let host = Arc::new(MockHost::new());
    let source = Arc::new(MockSource::default());
    let (core, _sim) = service(&host, &source);
    let subject = host.join("Alex", spawn_point(), &texture("https://textures.example/o", "o-sig"));

    assert!(matches!(
        core.apply_cape(subject.id, CapeType::Migrator),
        Err(ServiceError::CapesDisabled)
    ));
}

#[tokio::test]
async fn test_cape_is_generated_from_current_skin_and_applied() {
    let host = Arc::new(MockHost::new());
    let source = Arc::new(MockSource::default());
    let caped = texture("https://textures.example/caped", "caped-sig");
    let generator = StubGenerator::new(Ok(caped.clone()));
    let capes: Arc<dyn CapeGenerator> = generator.clone();
    let (core, mut sim) = service_with_capes(&host, &source, Some(capes));
    let subject = host.join("Alex", spawn_point(), &texture("https://textures.example/o", "o-sig"));

    core.apply_cape(subject.id, CapeType::Migrator).unwrap();
    tick_until_message(&mut sim, &host, subject.id, "Cape applied").await;

    assert_eq!(host.textures_of(subject.id), Some(caped));
    assert_eq!(
        generator.requests.lock().unwrap().as_slice(),
        &[(
            "https://textures.example/o".to_string(),
            CapeType::Migrator,
            SkinVariant::Classic
        )]
    );
    assert_eq!(
        host.messages_for(subject.id),
        vec!["Applying cape, please wait...".to_string(), "Cape applied successfully!".to_string()]
    );
}

#[tokio::test]
async fn test_cape_generation_failure_keeps_skin() {
    let host = Arc::new(MockHost::new());
    let source = Arc::new(MockSource::default());
    let generator = StubGenerator::new(Err(SyncError::Api {
        reason: "rate limited".to_string(),
    }));
    let (core, mut sim) = service_with_capes(&host, &source, Some(generator as Arc<dyn CapeGenerator>));
    let original = texture("https://textures.example/o", "o-sig");
    let subject = host.join("Alex", spawn_point(), &original);

    core.apply_cape(subject.id, CapeType::Birthday).unwrap();
    tick_until_message(&mut sim, &host, subject.id, "Failed to apply cape").await;

    assert_eq!(host.textures_of(subject.id), Some(original));
    let messages = host.messages_for(subject.id);
    assert!(messages.last().unwrap().contains("rate limited"));
}
