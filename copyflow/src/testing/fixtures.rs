//! Workflow fixtures.

use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::core::StateKey;
use crate::gateway::{CredentialResolver, Credentials, GenerationCapability, GenerationGateway};
use crate::session::Session;
use crate::state::{to_entries, MemoryStateStore, StateStore, WorkflowState};

/// A state in which every stage has run once.
#[must_use]
pub fn populated_state() -> WorkflowState {
    WorkflowState::new()
        .with(StateKey::RequirementsSource, "甲方：京东方新款显示器发布，突出护眼与高刷新率。")
        .with(StateKey::RequirementsText, "核心需求：护眼、高刷新率、面向电竞用户。")
        .with(StateKey::OutlineInstructions, "语气专业，多用数据。")
        .with(StateKey::ManuscriptType, "新闻通稿")
        .with(StateKey::Brand, "京东方")
        .with(StateKey::WordCount, "1500")
        .with(StateKey::OutlineMarkdown, "# 标题\n## 导语\n## 产品亮点")
        .with(StateKey::StyleSample, "样本稿件正文。")
        .with(StateKey::StyleReport, "风格：简洁克制。")
        .with(StateKey::CurrentDraft, "初稿正文。")
        .with(StateKey::PolishInstructions, "标题更抓人。")
}

/// A memory store holding `state`.
#[must_use]
pub fn store_with(state: &WorkflowState) -> MemoryStateStore {
    let store = MemoryStateStore::new();
    // A memory store cannot fail.
    let _ = store.set_many(&to_entries(state.iter()));
    store
}

/// Credentials carrying a session key, so no environment lookup happens.
#[must_use]
pub fn test_credentials() -> Credentials {
    Credentials::none().with_session("test-api-key")
}

/// A gateway over `capability` that never reads the environment.
#[must_use]
pub fn test_gateway(capability: Arc<dyn GenerationCapability>) -> GenerationGateway {
    GenerationGateway::new(capability, GenerationConfig::default())
        .with_resolver(CredentialResolver::without_env())
}

/// A session over a memory store and `capability`, with a stored API key.
#[must_use]
pub fn test_session(capability: Arc<dyn GenerationCapability>) -> (Session, Arc<MemoryStateStore>) {
    let store = Arc::new(MemoryStateStore::new());
    let _ = store.set(crate::state::API_KEY_SETTING, "test-api-key");
    let session = Session::new(store.clone(), Arc::new(test_gateway(capability)));
    (session, store)
}
