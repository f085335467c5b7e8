/*!
# Symbion DevKit - Stubs et Utilitaires pour tester le collecteur

Bibliothèque facilitant les tests du collecteur sans vrai parc d'hôtes :
- Hôtes stub exposant `/metrics` (délai, statut HTTP, corps modifiables à chaud)
- API de ressources stub (machine + conteneur racine, style cAdvisor)
- Builder de texte au format exposition
- Harness qui démarre et pilote plusieurs stubs
*/

pub mod exposition;
pub mod stub_host;
pub mod test_utils;

pub use exposition::ExpositionBuilder;
pub use stub_host::{StubHost, StubResourceApi};
pub use test_utils::TestHarness;
