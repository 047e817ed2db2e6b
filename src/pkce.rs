use crate::crypter::Crypter;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

pub const CODE_CHALLENGE_METHOD: &str = "S256";

pub struct Pkce {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl Pkce {
    /// The code verifier must have 43 to 128 chars.
    /// https://tools.ietf.org/html/rfc7636
    pub const LENGTH: usize = 64;

    /// A fresh pair; never reuse one across authorization attempts.
    pub fn generate(crypter: &dyn Crypter) -> Self {
        let code_verifier = crypter.generate(Self::LENGTH);
        let code_challenge = challenge(crypter, &code_verifier);
        Self {
            code_verifier,
            code_challenge,
        }
    }
}

pub fn challenge(crypter: &dyn Crypter, verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(crypter.hash(verifier.as_bytes()))
}
