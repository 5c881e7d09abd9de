//! Signed-message authentication.
//!
//! A caller proves control of an identity by signing a statement of the form
//!
//! ```text
//! Authenticate user <base58 user key> to game <base58 game key> on <domain>, valid from <unix secs> to <unix secs>
//! ```
//!
//! with the user's ed25519 key (raw signature over the UTF-8 bytes, no namespace).
//! A statement may be reused for any number of requests inside its validity window.

use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::from_hex;
use fairroll_types::{decode_key_bytes, decode_public_key, Identity, IdentityError, PUBLIC_KEY_LEN};
use std::fmt;

use crate::{now_unix, signing, AuthError};

const USER_PREFIX: &str = "Authenticate user ";
const GAME_PREFIX: &str = " to game ";
const DOMAIN_PREFIX: &str = " on ";
const VALID_FROM: &str = ", valid from ";
const VALID_TO: &str = " to ";

/// Typed contents of an authentication message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthStatement {
    pub user: PublicKey,
    /// Raw game key bytes. Compared against the trusted key before any point decoding.
    pub game: [u8; PUBLIC_KEY_LEN],
    /// Raw base58 game token, kept for error reporting.
    pub game_text: String,
    pub domain: String,
    pub valid_from: u64,
    pub valid_to: u64,
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    fn literal(&mut self, expected: &str) -> Result<(), AuthError> {
        match self.rest.strip_prefix(expected) {
            Some(rest) => {
                self.rest = rest;
                Ok(())
            }
            None => Err(AuthError::Malformed(format!("expected {expected:?}"))),
        }
    }

    fn take_while(&mut self, what: &str, accept: impl Fn(char) -> bool) -> Result<&'a str, AuthError> {
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| !accept(*c))
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        if end == 0 {
            return Err(AuthError::Malformed(format!("missing {what}")));
        }
        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(token)
    }

    fn until(&mut self, what: &str, delimiter: &str) -> Result<&'a str, AuthError> {
        let end = self
            .rest
            .find(delimiter)
            .ok_or_else(|| AuthError::Malformed(format!("missing {delimiter:?}")))?;
        if end == 0 {
            return Err(AuthError::Malformed(format!("missing {what}")));
        }
        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(token)
    }

    fn base58(&mut self, what: &str) -> Result<&'a str, AuthError> {
        self.take_while(what, is_base58_char)
    }

    fn uint(&mut self, what: &str) -> Result<u64, AuthError> {
        let digits = self.take_while(what, |c| c.is_ascii_digit())?;
        digits
            .parse()
            .map_err(|_| AuthError::Malformed(format!("{what} out of range")))
    }

    fn finish(self) -> Result<(), AuthError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Malformed("trailing characters".to_string()))
        }
    }
}

fn is_base58_char(c: char) -> bool {
    matches!(c, '1'..='9' | 'A'..='Z' | 'a'..='z')
}

fn malformed_key(what: &str) -> impl FnOnce(IdentityError) -> AuthError + '_ {
    move |err| AuthError::Malformed(format!("{what}: {err}"))
}

impl AuthStatement {
    pub fn parse(message: &str) -> Result<Self, AuthError> {
        let mut cursor = Cursor::new(message);
        cursor.literal(USER_PREFIX)?;
        let user = cursor.base58("user key")?;
        cursor.literal(GAME_PREFIX)?;
        let game = cursor.base58("game key")?;
        cursor.literal(DOMAIN_PREFIX)?;
        let domain = cursor.until("domain", VALID_FROM)?;
        cursor.literal(VALID_FROM)?;
        let valid_from = cursor.uint("valid from")?;
        cursor.literal(VALID_TO)?;
        let valid_to = cursor.uint("valid to")?;
        cursor.finish()?;

        Ok(Self {
            user: decode_public_key(user).map_err(malformed_key("user key"))?,
            game: decode_key_bytes(game).map_err(malformed_key("game key"))?,
            game_text: game.to_string(),
            domain: domain.to_string(),
            valid_from,
            valid_to,
        })
    }
}

impl fmt::Display for AuthStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{USER_PREFIX}{}{GAME_PREFIX}{}{DOMAIN_PREFIX}{}{VALID_FROM}{}{VALID_TO}{}",
            bs58_key(&self.user),
            self.game_text,
            self.domain,
            self.valid_from,
            self.valid_to
        )
    }
}

fn bs58_key(key: &PublicKey) -> String {
    Identity::from_public_key(key.clone()).to_base58()
}

/// Render the message a user signs to authenticate against `game` on `domain`.
pub fn auth_message(user: &PublicKey, game: &PublicKey, domain: &str, from: u64, to: u64) -> String {
    format!(
        "{USER_PREFIX}{}{GAME_PREFIX}{}{DOMAIN_PREFIX}{domain}{VALID_FROM}{from}{VALID_TO}{to}",
        bs58_key(user),
        bs58_key(game),
    )
}

/// Verifies signed authentication messages against the platform's game key.
#[derive(Clone, Debug)]
pub struct AuthVerifier {
    game: PublicKey,
    domain: String,
}

impl AuthVerifier {
    pub fn new(game: PublicKey, domain: impl Into<String>) -> Self {
        Self {
            game,
            domain: domain.into(),
        }
    }

    pub fn game_key(&self) -> &PublicKey {
        &self.game
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Verify `message` and its hex `signature` against the current wall clock.
    pub fn verify(&self, message: &str, signature: &str) -> Result<Identity, AuthError> {
        self.verify_at(message, signature, now_unix())
    }

    pub fn verify_at(&self, message: &str, signature: &str, now: u64) -> Result<Identity, AuthError> {
        let statement = AuthStatement::parse(message)?;
        if statement.domain != self.domain {
            return Err(AuthError::Malformed(format!(
                "unexpected domain {:?}",
                statement.domain
            )));
        }
        if statement.game.as_slice() != self.game.as_ref() {
            return Err(AuthError::WrongGame {
                provided: statement.game_text,
                expected: bs58_key(&self.game),
            });
        }
        if now < statement.valid_from || now > statement.valid_to {
            return Err(AuthError::Expired {
                from: statement.valid_from,
                to: statement.valid_to,
                now,
            });
        }

        let raw = from_hex(signature).ok_or(AuthError::BadSignature)?;
        if raw.len() != signing::SIGNATURE_LEN
            || !signing::verify(&statement.user, message.as_bytes(), &raw)
        {
            return Err(AuthError::BadSignature);
        }
        Ok(Identity::from_public_key(statement.user))
    }
}
