//! Realm pipeline.

mod put_realm;
mod settings;
mod sso;
mod users;

use realmsync_core::kinds::KeycloakRealm;

pub use put_realm::{PutRealm, SetLabels};
pub use settings::{AuthFlow, RealmSettings, UserProfile};
pub(crate) use sso::{mapper_representations, sync_identity_provider_mappers};
pub use sso::{
    PutDefaultIdp, PutIdentityProvider, PutKeycloakClientCr, PutKeycloakClientSecret,
    PutOpenIdConfigAnnotation,
};
pub use users::{PutUsers, PutUsersRoles};

use super::Chain;

pub fn realm_chain() -> Chain<KeycloakRealm> {
    Chain::new()
        .then(PutRealm)
        .then(SetLabels)
        .then(PutKeycloakClientCr)
        .then(PutKeycloakClientSecret)
        .then(PutUsers)
        .then(PutUsersRoles)
        .then(PutOpenIdConfigAnnotation)
        .then(PutIdentityProvider)
        .then(PutDefaultIdp)
        .then(RealmSettings)
        .then(UserProfile)
        .then(AuthFlow)
}
