/// The message a wallet signs to seed its stealth key tree.
///
/// The signature over this message is the only entropy that goes into the key tree, so the
/// text must never change for a deployed chain: a different message yields different keys and
/// funds sent to the old stealth addresses become unrecoverable from the new tree. The chain id
/// is part of the text so a signature collected on one chain cannot seed keys on another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationMessage(String);

pub const DERIVATION_MESSAGE_PREFIX: &str = "Sign this message to derive your private stealth keys.\n\nThis signature does not trigger a transaction and costs no gas.\nOnly sign it on applications you trust.\n\nChain ID: ";

impl DerivationMessage {
    pub fn for_chain(chain_id: u64) -> Self {
        Self(format!("{DERIVATION_MESSAGE_PREFIX}{chain_id}"))
    }

    /// A message other than the application default, e.g. for tests or a white-labelled app.
    pub fn custom(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}
