/*!
# vcpanel DevKit - Stubs et Utilitaires de test

Bibliothèque facilitant les tests du controller vcpanel avec:
- Transport simulé, scripté par route
- Fixtures JSON au format du backend
- Harness de test avec assertions sur requêtes et état
*/

pub mod transport_stub;
pub mod fixtures;
pub mod test_utils;

pub use anyhow;
pub use transport_stub::{RecordedRequest, StubReply, StubTransport};
pub use fixtures::VmBuilder;
pub use test_utils::TestHarness;
