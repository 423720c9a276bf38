//! Walk-through of a parent and child context.
//!
//! Run with `RUST_LOG=hayat_context=debug` to see every transition,
//! registration and construction.

use std::sync::Arc;

use async_trait::async_trait;
use hayat::prelude::*;
use parking_lot::Mutex;

// === Shared infrastructure, owned by the parent ===

#[derive(Default)]
struct AuditLog {
    entries: Mutex<Vec<String>>,
}

impl AuditLog {
    fn record(&self, entry: impl Into<String>) {
        let entry = entry.into();
        println!("[AUDIT] {entry}");
        self.entries.lock().push(entry);
    }
}

impl Scannable for AuditLog {
    fn metadata() -> TypeMetadata {
        TypeMetadata::default_constructed::<AuditLog>().singleton()
    }
}

// === Configuration producing units ===

struct DatabaseSettings {
    url: String,
}

struct Database {
    url: String,
}

struct InfrastructureConfiguration;

impl Scannable for InfrastructureConfiguration {
    fn metadata() -> TypeMetadata {
        TypeMetadata::new::<InfrastructureConfiguration>(Constructor::new(|_| async {
            Ok(InfrastructureConfiguration)
        }))
        .configuration()
        .provides(
            UnitMethod::new("settings", |_: Arc<InfrastructureConfiguration>, _: Arguments| async {
                Ok(DatabaseSettings { url: "postgres://localhost/app".into() })
            })
            .singleton(),
        )
        .provides(
            UnitMethod::new("database", |_: Arc<InfrastructureConfiguration>, args: Arguments| async move {
                let settings: Arc<DatabaseSettings> = args.get(0)?;
                Ok(Database { url: settings.url.clone() })
            })
            .singleton()
            .param::<DatabaseSettings>()
            .with_hook(
                HookPhase::Destroy,
                LifecycleHook::new("close", |db: Arc<Database>, args: Arguments| async move {
                    let audit: Arc<AuditLog> = args.get(0)?;
                    audit.record(format!("closed {}", db.url));
                    Ok(())
                })
                .param::<AuditLog>(),
            ),
        )
    }
}

// === Business logic, owned by the child ===

struct UserService {
    db: Arc<Database>,
}

impl UserService {
    fn find_user(&self, id: u64) -> String {
        format!("user {id} from {}", self.db.url)
    }
}

impl Scannable for UserService {
    fn metadata() -> TypeMetadata {
        TypeMetadata::new::<UserService>(Constructor::new(|args: Arguments| async move {
            Ok(UserService { db: args.get(0)? })
        }))
        .service()
        .depends_on::<Database>()
        .init(
            LifecycleHook::new("announce", |_: Arc<UserService>, args: Arguments| async move {
                let audit: Arc<AuditLog> = args.get(0)?;
                audit.record("user service ready");
                Ok(())
            })
            .param::<AuditLog>(),
        )
        .pre_destroy(
            LifecycleHook::new("drain", |_: Arc<UserService>, args: Arguments| async move {
                let audit: Arc<AuditLog> = args.get(0)?;
                audit.record("user service draining");
                Ok(())
            })
            .param::<AuditLog>(),
        )
    }
}

/// Records every unit the child context builds.
#[derive(Default)]
struct ConstructionAudit;

#[async_trait]
impl UnitPostProcessor for ConstructionAudit {
    async fn post_process_unit(&self, key: &UnitKey, unit: Unit) -> Result<Unit> {
        println!("[BUILT] {}", key.short_name());
        Ok(unit)
    }
}

impl Scannable for ConstructionAudit {
    fn metadata() -> TypeMetadata {
        TypeMetadata::default_constructed::<ConstructionAudit>()
            .post_processor(PostProcessorRole::unit::<ConstructionAudit>())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let parent = Context::builder()
        .settings(ContextSettings::named("infrastructure"))
        .scan::<AuditLog>()
        .build_shared()?;
    parent.initialize().await?;
    parent.start().await?;

    let child = Context::builder()
        .settings(
            ContextSettings::named("application")
                .with_destruction_order(DestructionOrder::ReverseDependency),
        )
        .parent(parent.clone())
        .scan::<ConstructionAudit>()
        .scan::<InfrastructureConfiguration>()
        .scan::<UserService>()
        .build()?;
    child.initialize().await?;
    child.start().await?;

    let users: Arc<UserService> = child.get().await?;
    println!("{}", users.find_user(42));

    // The child has no handle of its own, so this one comes from the parent.
    let handle: Arc<ContextHandle> = child.get().await?;
    if let Some(owner) = handle.upgrade() {
        println!("handle owner: {}", owner.settings().name.as_deref().unwrap_or("unnamed"));
    }

    match child.get_unit(UnitKey::of::<String>()).await {
        Ok(_) => println!("unexpected String unit"),
        Err(err) => println!("{err}"),
    }

    child.stop().await?;
    parent.stop().await?;

    let remaining = parent.factory().singletons().singleton_count();
    println!("parent singletons after stop: {remaining}");
    Ok(())
}
