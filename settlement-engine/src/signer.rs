use crate::error::{ErrorCode, Result};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use std::fmt;
use std::sync::Arc;

/// Account taking part in a planned action, resolved once at the boundary.
/// Read-only contexts (e.g., planning for an authority that signs elsewhere)
/// use [AccountSigner::PublicKeyOnly].
#[derive(Clone)]
pub enum AccountSigner {
    Keypair(Arc<Keypair>),
    PublicKeyOnly(Pubkey),
}

impl AccountSigner {
    pub fn pubkey(&self) -> Pubkey {
        match self {
            AccountSigner::Keypair(keypair) => keypair.pubkey(),
            AccountSigner::PublicKeyOnly(pubkey) => *pubkey,
        }
    }

    pub fn can_sign(&self) -> bool {
        matches!(self, AccountSigner::Keypair(_))
    }

    pub fn try_sign_message(&self, message: &[u8]) -> Result<Signature> {
        match self {
            AccountSigner::Keypair(keypair) => keypair
                .try_sign_message(message)
                .map_err(|_| ErrorCode::SignerNotAvailable(keypair.pubkey())),
            AccountSigner::PublicKeyOnly(pubkey) => Err(ErrorCode::SignerNotAvailable(*pubkey)),
        }
    }
}

impl From<Pubkey> for AccountSigner {
    fn from(pubkey: Pubkey) -> Self {
        AccountSigner::PublicKeyOnly(pubkey)
    }
}

impl From<Keypair> for AccountSigner {
    fn from(keypair: Keypair) -> Self {
        AccountSigner::Keypair(Arc::new(keypair))
    }
}

impl From<Arc<Keypair>> for AccountSigner {
    fn from(keypair: Arc<Keypair>) -> Self {
        AccountSigner::Keypair(keypair)
    }
}

impl fmt::Debug for AccountSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountSigner::Keypair(keypair) => {
                f.debug_tuple("Keypair").field(&keypair.pubkey()).finish()
            }
            AccountSigner::PublicKeyOnly(pubkey) => {
                f.debug_tuple("PublicKeyOnly").field(pubkey).finish()
            }
        }
    }
}

impl PartialEq for AccountSigner {
    fn eq(&self, other: &Self) -> bool {
        self.pubkey() == other.pubkey() && self.can_sign() == other.can_sign()
    }
}
