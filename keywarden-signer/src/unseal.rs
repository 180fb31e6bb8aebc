//! Passphrase decryption of the sealed CA key.
//!
//! The sealed payload is an armored, symmetrically-encrypted PGP message.
//! The passphrase is supplied exactly once per unseal attempt; a rejected
//! passphrase fails fast rather than retrying.

use std::io::Read;

use anyhow::Context;
use sequoia_openpgp as openpgp;

use openpgp::{
    crypto::{Password, SessionKey},
    packet::{PKESK, SKESK},
    parse::{
        stream::{
            DecryptionHelper, DecryptorBuilder, MessageStructure,
            VerificationHelper,
        },
        Parse,
    },
    policy::StandardPolicy,
    types::SymmetricAlgorithm,
    Cert, Fingerprint, KeyHandle,
};

/// Decrypt an armored PGP message with `passphrase` and return the
/// plaintext. Only the symmetric (passphrase) encryption path is supported;
/// the sealed CA key is never public-key encrypted.
pub fn decrypt_armored(
    armored: &[u8],
    passphrase: &str,
) -> anyhow::Result<Vec<u8>> {
    let policy = StandardPolicy::new();
    let helper = PassphraseHelper {
        passphrase: Password::from(passphrase),
    };

    let mut decryptor = DecryptorBuilder::from_bytes(armored)
        .context("Malformed PGP message")?
        .with_policy(&policy, None, helper)
        .context("Could not decrypt the CA key")?;

    let mut plaintext = Vec::new();
    decryptor
        .read_to_end(&mut plaintext)
        .context("Could not read the decrypted CA key")?;
    Ok(plaintext)
}

/// Offers the supplied passphrase against each SKESK packet, once.
struct PassphraseHelper {
    passphrase: Password,
}

impl VerificationHelper for PassphraseHelper {
    fn get_certs(
        &mut self,
        _ids: &[KeyHandle],
    ) -> openpgp::Result<Vec<Cert>> {
        Ok(Vec::new())
    }

    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        // The payload is authenticated by the passphrase alone; there is no
        // signing key to verify against.
        Ok(())
    }
}

impl DecryptionHelper for PassphraseHelper {
    fn decrypt<D>(
        &mut self,
        _pkesks: &[PKESK],
        skesks: &[SKESK],
        _sym_algo: Option<SymmetricAlgorithm>,
        mut decrypt: D,
    ) -> openpgp::Result<Option<Fingerprint>>
    where
        D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    {
        for skesk in skesks {
            if let Ok((algo, session_key)) = skesk.decrypt(&self.passphrase) {
                if decrypt(algo, &session_key) {
                    return Ok(None);
                }
            }
        }
        Err(anyhow::anyhow!(
            "passphrase did not decrypt the sealed CA key"
        ))
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use openpgp::serialize::stream::{
        Armorer, Encryptor2, LiteralWriter, Message,
    };

    use super::*;

    /// Symmetrically encrypt `plaintext` into an armored message, the same
    /// shape an operator produces with `gpg --symmetric --armor`.
    pub(crate) fn encrypt_armored(
        plaintext: &[u8],
        passphrase: &str,
    ) -> Vec<u8> {
        let mut sink = Vec::new();
        let message = Message::new(&mut sink);
        let message = Armorer::new(message)
            .kind(openpgp::armor::Kind::Message)
            .build()
            .expect("armorer");
        let message = Encryptor2::with_passwords(
            message,
            Some(Password::from(passphrase)),
        )
        .build()
        .expect("encryptor build");
        let mut literal =
            LiteralWriter::new(message).build().expect("literal writer");
        literal.write_all(plaintext).expect("write");
        literal.finalize().expect("finalize");
        sink
    }

    #[test]
    fn round_trips_with_the_right_passphrase() {
        let armored = encrypt_armored(b"the payload", "hunter2");
        assert!(armored.starts_with(b"-----BEGIN PGP MESSAGE-----"));

        let plaintext = decrypt_armored(&armored, "hunter2").unwrap();
        assert_eq!(plaintext, b"the payload");
    }

    #[test]
    fn rejects_a_wrong_passphrase() {
        let armored = encrypt_armored(b"the payload", "hunter2");
        assert!(decrypt_armored(&armored, "wrong").is_err());
    }

    #[test]
    fn rejects_garbage_input() {
        assert!(decrypt_armored(b"not pgp at all", "hunter2").is_err());
    }
}
