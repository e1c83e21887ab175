//! Realm roles, declared one by one or in batches.

use async_trait::async_trait;
use realmsync_core::kinds::{
    BatchRole, KeycloakRealm, KeycloakRealmRole, KeycloakRealmRoleBatch, KeycloakRealmRoleSpec,
};
use realmsync_core::names::{REALM_ROLE_BATCH_FINALIZER, REALM_ROLE_FINALIZER, default_roles_name};
use realmsync_core::{HasStatus, ObjectKey, ObjectMeta, ObjectRef, OwnerReference, Resource, Status};
use realmsync_keycloak::KeycloakApi;
use realmsync_keycloak::models::RoleRepresentation;
use realmsync_storage::ListParams;
use tracing::{debug, info};

use super::{Converge, Reconciler, Synced, connect, drive};
use crate::chain::split_names;
use crate::context::Context;
use crate::error::{ReconcileError, ReconcileResult};
use crate::lifecycle::Action;
use crate::terminators::{RemoteTarget, RemoteTerminator, RoleBatchTerminator};

pub struct RealmRoleReconciler {
    ctx: Context,
}

impl RealmRoleReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for RealmRoleReconciler {
    fn kind(&self) -> &'static str {
        KeycloakRealmRole::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        drive(self, key).await
    }
}

#[async_trait]
impl Converge for RealmRoleReconciler {
    type Object = KeycloakRealmRole;

    fn context(&self) -> &Context {
        &self.ctx
    }

    async fn converge(&self, role: &mut KeycloakRealmRole) -> ReconcileResult<Synced> {
        let Some(conn) = connect(&self.ctx, role, REALM_ROLE_FINALIZER).await? else {
            return Ok(Synced::Skip(Action::Done));
        };

        let result = async {
            let realm = conn.realm_name();
            let terminator = RemoteTerminator::new(
                conn.api.clone(),
                realm,
                RemoteTarget::RealmRole(role.spec.name.clone()),
                &role.metadata,
            );
            if self
                .ctx
                .lifecycle
                .try_to_delete(role, &terminator, REALM_ROLE_FINALIZER)
                .await?
            {
                return Ok(Synced::Skip(Action::Done));
            }

            let id = sync_realm_role(conn.api.as_ref(), realm, &role.spec).await?;
            role.status_mut().id = id;
            Ok(Synced::Converged)
        }
        .await;
        self.ctx.helper.settle(&conn.keycloak, result).await
    }
}

fn desired_role(spec: &KeycloakRealmRoleSpec) -> RoleRepresentation {
    RoleRepresentation {
        description: Some(spec.description.clone()).filter(|d| !d.is_empty()),
        composite: spec.composite,
        attributes: spec.attributes.clone(),
        ..RoleRepresentation::named(&spec.name)
    }
}

/// Converges one realm role and returns its server id.
async fn sync_realm_role(
    api: &dyn KeycloakApi,
    realm: &str,
    spec: &KeycloakRealmRoleSpec,
) -> ReconcileResult<Option<String>> {
    let name = spec.name.as_str();
    let desired = desired_role(spec);

    let current = match api.get_realm_role(realm, name).await? {
        Some(current) => current,
        None => {
            info!(realm, role = name, "Creating realm role");
            match api.create_realm_role(realm, &desired).await {
                Err(e) if e.is_conflict() => {
                    return Err(ReconcileError::Duplicate(format!("realm role {name}")));
                }
                other => other?,
            }
            api.get_realm_role(realm, name)
                .await?
                .ok_or_else(|| ReconcileError::validation(format!("realm role {name} vanished after create")))?
        }
    };

    if spec.composite {
        sync_composites(api, realm, name, &spec.composites).await?;
    }

    let unchanged = current.description == desired.description
        && current.attributes == desired.attributes
        && current.composite == desired.composite;
    if unchanged {
        debug!(realm, role = name, "Realm role up to date");
    } else {
        info!(realm, role = name, "Updating realm role");
        let update = RoleRepresentation {
            id: current.id.clone(),
            container_id: current.container_id.clone(),
            ..desired
        };
        api.update_realm_role(realm, &update).await?;
    }

    if spec.is_default {
        let default_roles = default_roles_name(realm);
        let composites = api.get_realm_role_composites(realm, &default_roles).await?;
        if !composites.iter().any(|r| r.name == name) {
            info!(realm, role = name, "Adding role to the realm defaults");
            api.add_realm_role_composites(realm, &default_roles, std::slice::from_ref(&current))
                .await?;
        }
    }

    Ok(current.id)
}

async fn sync_composites(
    api: &dyn KeycloakApi,
    realm: &str,
    name: &str,
    declared: &[String],
) -> ReconcileResult<()> {
    let current = api.get_realm_role_composites(realm, name).await?;
    let (missing, extra) = split_names(
        declared.iter().map(String::as_str),
        current.iter().map(|r| r.name.as_str()),
    );

    if !missing.is_empty() {
        let mut add = Vec::with_capacity(missing.len());
        for composite in missing {
            let role = api.get_realm_role(realm, composite).await?.ok_or_else(|| {
                ReconcileError::validation(format!("composite role {composite} does not exist"))
            })?;
            add.push(role);
        }
        info!(realm, role = name, count = add.len(), "Adding composite roles");
        api.add_realm_role_composites(realm, name, &add).await?;
    }

    if !extra.is_empty() {
        let remove: Vec<RoleRepresentation> = current
            .iter()
            .filter(|r| extra.contains(&r.name.as_str()))
            .cloned()
            .collect();
        info!(realm, role = name, count = remove.len(), "Removing composite roles");
        api.remove_realm_role_composites(realm, name, &remove).await?;
    }
    Ok(())
}

/// Materializes a batch as individual `KeycloakRealmRole` objects.
pub struct RealmRoleBatchReconciler {
    ctx: Context,
}

impl RealmRoleBatchReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    fn child_role(
        batch: &KeycloakRealmRoleBatch,
        realm: &KeycloakRealm,
        role: &BatchRole,
    ) -> KeycloakRealmRole {
        let mut metadata = ObjectMeta::new(batch.namespace(), batch.child_role_name(&role.name));
        metadata.owner_references = vec![
            realm.owner_reference(),
            OwnerReference {
                controller: false,
                ..batch.owner_reference()
            },
        ];
        KeycloakRealmRole {
            metadata,
            spec: KeycloakRealmRoleSpec {
                name: role.name.clone(),
                realm: String::new(),
                realm_ref: Some(ObjectRef::new(KeycloakRealm::KIND, realm.name())),
                description: role.description.clone(),
                composite: role.composite,
                composites: role.composites.clone(),
                attributes: role.attributes.clone(),
                is_default: role.is_default,
            },
            status: Status::default(),
        }
    }

    async fn put_roles(
        &self,
        batch: &KeycloakRealmRoleBatch,
        realm: &KeycloakRealm,
    ) -> ReconcileResult<()> {
        let store = &self.ctx.store;
        let owner = batch.owner_reference();

        for role in &batch.spec.roles {
            let name = batch.child_role_name(&role.name);
            match store
                .try_get_object::<KeycloakRealmRole>(batch.namespace(), &name)
                .await?
            {
                Some(existing) if existing.metadata.is_owned_by(&owner) => {
                    debug!(batch = %batch.name(), role = %name, "Batch role already created");
                }
                Some(_) => {
                    return Err(ReconcileError::validation(format!(
                        "realm role {name} already exists and is not owned by batch {}",
                        batch.name()
                    )));
                }
                None => {
                    info!(batch = %batch.name(), role = %name, "Creating batch role");
                    store
                        .create_object(&Self::child_role(batch, realm, role))
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn remove_roles(&self, batch: &KeycloakRealmRoleBatch) -> ReconcileResult<()> {
        let owner = batch.owner_reference();
        let declared: Vec<String> = batch
            .spec
            .roles
            .iter()
            .map(|r| batch.child_role_name(&r.name))
            .collect();

        let roles = self
            .ctx
            .store
            .list_objects::<KeycloakRealmRole>(&ListParams::new().in_namespace(batch.namespace()))
            .await?;
        for role in roles
            .iter()
            .filter(|r| r.metadata.is_owned_by(&owner) && !declared.iter().any(|d| d == r.name()))
        {
            info!(batch = %batch.name(), role = %role.name(), "Deleting undeclared batch role");
            match self.ctx.store.delete_object(role).await {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Reconciler for RealmRoleBatchReconciler {
    fn kind(&self) -> &'static str {
        KeycloakRealmRoleBatch::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> Action {
        drive(self, key).await
    }
}

#[async_trait]
impl Converge for RealmRoleBatchReconciler {
    type Object = KeycloakRealmRoleBatch;

    fn context(&self) -> &Context {
        &self.ctx
    }

    async fn converge(&self, batch: &mut KeycloakRealmRoleBatch) -> ReconcileResult<Synced> {
        let terminator = RoleBatchTerminator::new(self.ctx.store.clone(), batch);
        if self
            .ctx
            .lifecycle
            .try_to_delete(batch, &terminator, REALM_ROLE_BATCH_FINALIZER)
            .await?
        {
            return Ok(Synced::Skip(Action::Done));
        }

        let realm = self.ctx.helper.owner_realm(batch).await?;
        self.put_roles(batch, &realm).await?;
        self.remove_roles(batch).await?;
        Ok(Synced::Converged)
    }
}
