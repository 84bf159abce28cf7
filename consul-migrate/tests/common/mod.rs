//! In-memory cluster used by the export/import tests.

#![allow(dead_code)]

use async_trait::async_trait;
use consul_migrate::client::{ClientError, ClientResult, PolicyStub, RoleStub, TokenStub};
use consul_migrate::snapshot::ANONYMOUS_TOKEN_ID;
use consul_migrate::{ConsulApi, EntityKind, Namespace, Policy, Role, Scope, Token};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_NS: &str = "default";

/// Write operation observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateNamespace(String),
    CreatePolicy { ns: String, name: String },
    CreateRole { ns: String, name: String },
    CreateToken { ns: String, accessor_id: String },
    UpdateToken { ns: String, accessor_id: String },
}

#[derive(Default)]
struct ScopeState {
    policies: BTreeMap<String, Policy>,
    roles: BTreeMap<String, Role>,
    tokens: BTreeMap<String, Token>,
}

struct State {
    version: Option<serde_json::Value>,
    namespaces: Vec<Namespace>,
    scopes: HashMap<String, ScopeState>,
    calls: Vec<Call>,
    creates: HashMap<&'static str, usize>,
    /// (kind, n): the n-th create of that kind fails
    fail_create: Option<(&'static str, usize)>,
    fail_reads: bool,
    unreachable: bool,
    next_index: u64,
}

pub struct FakeCluster {
    state: Mutex<State>,
}

fn kind_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Namespace => "namespace",
        EntityKind::Policy => "policy",
        EntityKind::Role => "role",
        EntityKind::Token => "token",
    }
}

fn scope_key(scope: &Scope) -> String {
    scope.namespace_name().unwrap_or(DEFAULT_NS).to_string()
}

impl FakeCluster {
    fn with_version(version: &str) -> Self {
        let mut scopes = HashMap::new();
        let mut default = ScopeState::default();
        let mut anonymous = Token::new(ANONYMOUS_TOKEN_ID);
        anonymous.description = "Anonymous Token".into();
        anonymous.secret_id = Some("anonymous".into());
        default.tokens.insert(ANONYMOUS_TOKEN_ID.to_string(), anonymous);
        scopes.insert(DEFAULT_NS.to_string(), default);

        Self {
            state: Mutex::new(State {
                version: Some(json!({ "Config": { "Version": version } })),
                namespaces: Vec::new(),
                scopes,
                calls: Vec::new(),
                creates: HashMap::new(),
                fail_create: None,
                fail_reads: false,
                unreachable: false,
                next_index: 10,
            }),
        }
    }

    pub fn oss() -> Self {
        Self::with_version("1.9.3")
    }

    pub fn enterprise() -> Self {
        let cluster = Self::with_version("1.9.3+ent");
        cluster.state.lock().namespaces.push(Namespace::new(DEFAULT_NS));
        cluster
    }

    /// Replace the agent self-description wholesale
    pub fn set_agent_info(&self, info: serde_json::Value) {
        self.state.lock().version = Some(info);
    }

    pub fn set_unreachable(&self) {
        self.state.lock().unreachable = true;
    }

    pub fn fail_nth_create(&self, kind: EntityKind, n: usize) {
        self.state.lock().fail_create = Some((kind_key(kind), n));
    }

    pub fn fail_reads(&self) {
        self.state.lock().fail_reads = true;
    }

    pub fn add_namespace(&self, namespace: Namespace) {
        let mut state = self.state.lock();
        state.scopes.entry(namespace.name.clone()).or_default();
        state.namespaces.push(namespace);
    }

    pub fn seed_policy(&self, ns: &str, policy: Policy) {
        let mut state = self.state.lock();
        state.scopes.entry(ns.to_string()).or_default().policies.insert(policy.id.clone(), policy);
    }

    pub fn seed_role(&self, ns: &str, role: Role) {
        let mut state = self.state.lock();
        state.scopes.entry(ns.to_string()).or_default().roles.insert(role.id.clone(), role);
    }

    pub fn seed_token(&self, ns: &str, token: Token) {
        let mut state = self.state.lock();
        state
            .scopes
            .entry(ns.to_string())
            .or_default()
            .tokens
            .insert(token.accessor_id.clone(), token);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.state.lock().namespaces.iter().map(|n| n.name.clone()).collect()
    }

    pub fn policies(&self, ns: &str) -> Vec<Policy> {
        let state = self.state.lock();
        state.scopes.get(ns).map(|s| s.policies.values().cloned().collect()).unwrap_or_default()
    }

    pub fn roles(&self, ns: &str) -> Vec<Role> {
        let state = self.state.lock();
        state.scopes.get(ns).map(|s| s.roles.values().cloned().collect()).unwrap_or_default()
    }

    pub fn tokens(&self, ns: &str) -> Vec<Token> {
        let state = self.state.lock();
        state.scopes.get(ns).map(|s| s.tokens.values().cloned().collect()).unwrap_or_default()
    }

    pub fn policy_by_name(&self, ns: &str, name: &str) -> Option<Policy> {
        self.policies(ns).into_iter().find(|p| p.name == name)
    }

    pub fn role_by_name(&self, ns: &str, name: &str) -> Option<Role> {
        self.roles(ns).into_iter().find(|r| r.name == name)
    }

    pub fn token(&self, ns: &str, accessor_id: &str) -> Option<Token> {
        self.tokens(ns).into_iter().find(|t| t.accessor_id == accessor_id)
    }
}

impl State {
    fn check_reachable(&self) -> ClientResult<()> {
        if self.unreachable {
            Err(ClientError::Unreachable("connection refused".into()))
        } else {
            Ok(())
        }
    }

    fn check_read(&self) -> ClientResult<()> {
        self.check_reachable()?;
        if self.fail_reads {
            return Err(ClientError::Status {
                status: 403,
                body: "Permission denied".into(),
            });
        }
        Ok(())
    }

    /// Count a create of `kind` and fail it if it is the injected one
    fn check_create(&mut self, kind: &'static str) -> ClientResult<()> {
        self.check_reachable()?;
        let count = self.creates.entry(kind).or_insert(0);
        *count += 1;
        if self.fail_create == Some((kind, *count)) {
            return Err(ClientError::Status {
                status: 500,
                body: format!("injected {} failure", kind),
            });
        }
        Ok(())
    }

    fn scope(&mut self, scope: &Scope) -> ClientResult<&mut ScopeState> {
        let key = scope_key(scope);
        self.scopes
            .get_mut(&key)
            .ok_or_else(|| ClientError::Status {
                status: 400,
                body: format!("Namespace {:?} does not exist", key),
            })
    }

    fn next_id(&mut self, prefix: &str) -> (String, u64) {
        self.next_index += 1;
        (format!("{}-{}", prefix, self.next_index), self.next_index)
    }
}

#[async_trait]
impl ConsulApi for FakeCluster {
    async fn agent_self(&self) -> ClientResult<serde_json::Value> {
        let state = self.state.lock();
        state.check_reachable()?;
        state
            .version
            .clone()
            .ok_or_else(|| ClientError::Unreachable("no agent".into()))
    }

    async fn list_namespaces(&self) -> ClientResult<Vec<Namespace>> {
        let state = self.state.lock();
        state.check_read()?;
        Ok(state.namespaces.clone())
    }

    async fn create_namespace(&self, namespace: &Namespace) -> ClientResult<Namespace> {
        let mut state = self.state.lock();
        state.check_create("namespace")?;
        if state.namespaces.iter().any(|n| n.name == namespace.name) {
            return Err(ClientError::Status {
                status: 400,
                body: format!("Namespace {:?} already exists", namespace.name),
            });
        }
        let mut created = namespace.clone();
        let (_, index) = state.next_id("ns");
        created.create_index = index;
        created.modify_index = index;
        state.calls.push(Call::CreateNamespace(created.name.clone()));
        state.scopes.entry(created.name.clone()).or_default();
        state.namespaces.push(created.clone());
        Ok(created)
    }

    async fn list_policies(&self, scope: &Scope) -> ClientResult<Vec<PolicyStub>> {
        let mut state = self.state.lock();
        state.check_read()?;
        Ok(state
            .scope(scope)?
            .policies
            .values()
            .map(|p| PolicyStub {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .collect())
    }

    async fn read_policy(&self, id: &str, scope: &Scope) -> ClientResult<Policy> {
        let mut state = self.state.lock();
        state.check_read()?;
        state
            .scope(scope)?
            .policies
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("policy {}", id)))
    }

    async fn create_policy(&self, policy: &Policy, scope: &Scope) -> ClientResult<Policy> {
        let mut state = self.state.lock();
        state.check_create("policy")?;
        let (id, index) = state.next_id("policy");
        let mut created = policy.clone();
        created.id = id;
        created.create_index = index;
        created.modify_index = index;
        created.hash = Some("ZmFrZQ==".into());
        created.namespace = scope.namespace_name().map(str::to_string);
        state.scope(scope)?.policies.insert(created.id.clone(), created.clone());
        state.calls.push(Call::CreatePolicy {
            ns: scope_key(scope),
            name: created.name.clone(),
        });
        Ok(created)
    }

    async fn list_roles(&self, scope: &Scope) -> ClientResult<Vec<RoleStub>> {
        let mut state = self.state.lock();
        state.check_read()?;
        Ok(state
            .scope(scope)?
            .roles
            .values()
            .map(|r| RoleStub {
                id: r.id.clone(),
                name: r.name.clone(),
            })
            .collect())
    }

    async fn read_role(&self, id: &str, scope: &Scope) -> ClientResult<Role> {
        let mut state = self.state.lock();
        state.check_read()?;
        state
            .scope(scope)?
            .roles
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("role {}", id)))
    }

    async fn create_role(&self, role: &Role, scope: &Scope) -> ClientResult<Role> {
        let mut state = self.state.lock();
        state.check_create("role")?;
        let (id, index) = state.next_id("role");
        let mut created = role.clone();
        created.id = id;
        created.create_index = index;
        created.modify_index = index;
        created.namespace = scope.namespace_name().map(str::to_string);
        state.scope(scope)?.roles.insert(created.id.clone(), created.clone());
        state.calls.push(Call::CreateRole {
            ns: scope_key(scope),
            name: created.name.clone(),
        });
        Ok(created)
    }

    async fn list_tokens(&self, scope: &Scope) -> ClientResult<Vec<TokenStub>> {
        let mut state = self.state.lock();
        state.check_read()?;
        Ok(state
            .scope(scope)?
            .tokens
            .values()
            .map(|t| TokenStub {
                accessor_id: t.accessor_id.clone(),
                description: t.description.clone(),
            })
            .collect())
    }

    async fn read_token(&self, accessor_id: &str, scope: &Scope) -> ClientResult<Token> {
        let mut state = self.state.lock();
        state.check_read()?;
        state
            .scope(scope)?
            .tokens
            .get(accessor_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("token {}", accessor_id)))
    }

    async fn create_token(&self, token: &Token, scope: &Scope) -> ClientResult<Token> {
        let mut state = self.state.lock();
        state.check_create("token")?;
        let (generated, index) = state.next_id("token");
        let mut created = token.clone();
        if created.accessor_id.is_empty() {
            created.accessor_id = generated;
        }
        created.create_index = index;
        created.modify_index = index;
        created.namespace = scope.namespace_name().map(str::to_string);

        let tokens = &mut state.scope(scope)?.tokens;
        if tokens.contains_key(&created.accessor_id) {
            return Err(ClientError::Status {
                status: 400,
                body: format!("AccessorID {:?} is already in use", created.accessor_id),
            });
        }
        tokens.insert(created.accessor_id.clone(), created.clone());
        state.calls.push(Call::CreateToken {
            ns: scope_key(scope),
            accessor_id: created.accessor_id.clone(),
        });
        Ok(created)
    }

    async fn update_token(&self, token: &Token, scope: &Scope) -> ClientResult<Token> {
        let mut state = self.state.lock();
        state.check_reachable()?;
        let (_, index) = state.next_id("token");
        let tokens = &mut state.scope(scope)?.tokens;
        let existing = tokens
            .get_mut(&token.accessor_id)
            .ok_or_else(|| ClientError::NotFound(format!("token {}", token.accessor_id)))?;
        let create_index = existing.create_index;
        *existing = token.clone();
        existing.create_index = create_index;
        existing.modify_index = index;
        let updated = existing.clone();
        state.calls.push(Call::UpdateToken {
            ns: scope_key(scope),
            accessor_id: token.accessor_id.clone(),
        });
        Ok(updated)
    }
}
