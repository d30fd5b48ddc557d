use crate::common::types::{Address, KeyHash, RandomWord, RequestId, SubscriptionId};
use rand_core::OsRng;
use schnorrkel::vrf::{VRFPreOut, VRFProof};
use schnorrkel::{context::SigningContext, Keypair, PublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const VRF_SIGNING_CONTEXT: &[u8] = b"raffle-randomness";
const VRF_OUTPUT_CONTEXT: &[u8] = b"raffle-randomness-output";

/// Proof bundle published alongside a fulfilled request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessProof {
    /// Hex-encoded VRF output (32 bytes)
    pub output: String,
    /// Hex-encoded VRF pre-output (32 bytes) the output is derived from
    pub pre_output: String,
    /// Hex-encoded DLEQ proof (64 bytes)
    pub proof: String,
    /// Hex-encoded public key (32 bytes)
    pub public_key: String,
    /// Input message the proof commits to
    pub input_message: String,
}

/// Verifiable randomness source backing the local coordinator
pub struct VrfEngine {
    keypair: Arc<Keypair>,
}

impl VrfEngine {
    /// Create a new VRF engine with a keypair
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Create a new VRF engine with a random keypair
    pub fn new_random() -> Self {
        Self::new(Keypair::generate_with(OsRng))
    }

    /// Deterministic input message for a request
    pub fn input_message(
        request_id: RequestId,
        key_hash: &KeyHash,
        consumer: &Address,
        subscription_id: SubscriptionId,
    ) -> String {
        format!("{}:{}:{}:{}", request_id, key_hash, consumer, subscription_id)
    }

    /// Produce output and proof for an input message.
    ///
    /// The output depends only on the key and the input; the proof bytes may
    /// differ between calls but every one of them verifies to the same output.
    pub fn generate(&self, input_message: &str) -> RandomnessProof {
        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let (inout, proof, _) = self.keypair.vrf_sign(ctx.bytes(input_message.as_bytes()));
        let output: [u8; 32] = inout.make_bytes(VRF_OUTPUT_CONTEXT);

        RandomnessProof {
            output: hex::encode(output),
            pre_output: hex::encode(inout.to_preout().to_bytes()),
            proof: hex::encode(proof.to_bytes()),
            public_key: hex::encode(self.keypair.public.to_bytes()),
            input_message: input_message.to_string(),
        }
    }

    /// Expand a 32-byte output into `num_words` independent words
    pub fn random_words(output: &[u8; 32], num_words: u32) -> Vec<RandomWord> {
        (0..num_words)
            .map(|index| {
                let mut hasher = Sha256::new();
                hasher.update(output);
                hasher.update(index.to_be_bytes());
                RandomWord::from_bytes(hasher.finalize().into())
            })
            .collect()
    }

    /// Words committed to by a proof bundle
    pub fn words_from_proof(proof: &RandomnessProof, num_words: u32) -> Result<Vec<RandomWord>, String> {
        let output: [u8; 32] = hex::decode(&proof.output)
            .map_err(|e| format!("Invalid VRF output hex: {}", e))?
            .try_into()
            .map_err(|_| "VRF output must be 32 bytes".to_string())?;
        Ok(Self::random_words(&output, num_words))
    }

    /// Verify a proof bundle against the expected input (public verification)
    pub fn verify_proof(proof: &RandomnessProof, expected_input: &str) -> Result<bool, String> {
        if proof.input_message != expected_input {
            return Ok(false);
        }

        let output = hex::decode(&proof.output).map_err(|e| format!("Invalid VRF output hex: {}", e))?;
        let pre_output_bytes =
            hex::decode(&proof.pre_output).map_err(|e| format!("Invalid VRF pre-output hex: {}", e))?;
        let proof_bytes = hex::decode(&proof.proof).map_err(|e| format!("Invalid VRF proof hex: {}", e))?;
        let public_key_bytes =
            hex::decode(&proof.public_key).map_err(|e| format!("Invalid public key hex: {}", e))?;

        let public_key =
            PublicKey::from_bytes(&public_key_bytes).map_err(|e| format!("Invalid public key: {:?}", e))?;
        let pre_output =
            VRFPreOut::from_bytes(&pre_output_bytes).map_err(|e| format!("Invalid VRF pre-output: {:?}", e))?;
        let vrf_proof = VRFProof::from_bytes(&proof_bytes).map_err(|e| format!("Invalid VRF proof: {:?}", e))?;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let inout = match public_key.vrf_verify(ctx.bytes(expected_input.as_bytes()), &pre_output, &vrf_proof) {
            Ok((inout, _)) => inout,
            Err(_) => return Ok(false),
        };

        let computed: [u8; 32] = inout.make_bytes(VRF_OUTPUT_CONTEXT);
        Ok(computed.as_slice() == output.as_slice())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> String {
        VrfEngine::input_message(
            RequestId(1),
            &KeyHash::new([7u8; 32]),
            &Address::from_label("raffle"),
            1,
        )
    }

    #[test]
    fn test_generation_and_verification() {
        let engine = VrfEngine::new_random();
        let proof = engine.generate(&input());

        assert!(VrfEngine::verify_proof(&proof, &input()).unwrap());
        assert_eq!(proof.public_key, engine.public_key_hex());
    }

    #[test]
    fn test_tampered_output_is_rejected() {
        let engine = VrfEngine::new_random();
        let mut proof = engine.generate(&input());
        proof.output = hex::encode([0xffu8; 32]);

        assert!(!VrfEngine::verify_proof(&proof, &input()).unwrap());
    }

    #[test]
    fn test_wrong_input_is_rejected() {
        let engine = VrfEngine::new_random();
        let proof = engine.generate(&input());

        assert!(!VrfEngine::verify_proof(&proof, "2:other").unwrap());
    }

    #[test]
    fn test_output_is_fixed_per_input() {
        let engine = VrfEngine::new_random();
        let first = engine.generate(&input());
        let second = engine.generate(&input());

        assert_eq!(first.output, second.output);
        assert_eq!(first.pre_output, second.pre_output);
        assert!(VrfEngine::verify_proof(&second, &input()).unwrap());
        assert_eq!(
            VrfEngine::words_from_proof(&first, 1).unwrap(),
            VrfEngine::words_from_proof(&second, 1).unwrap()
        );

        let other = engine.generate("2:other");
        assert_ne!(other.output, first.output);
    }

    #[test]
    fn test_pre_output_from_other_input_is_rejected() {
        let engine = VrfEngine::new_random();
        let mut proof = engine.generate(&input());
        proof.pre_output = engine.generate("2:other").pre_output;

        assert!(!VrfEngine::verify_proof(&proof, &input()).unwrap());
    }

    #[test]
    fn test_words_are_distinct_and_reproducible() {
        let engine = VrfEngine::new_random();
        let proof = engine.generate(&input());

        let words = VrfEngine::words_from_proof(&proof, 3).unwrap();
        assert_eq!(words.len(), 3);
        assert_ne!(words[0], words[1]);
        assert_ne!(words[1], words[2]);
        assert_eq!(VrfEngine::words_from_proof(&proof, 3).unwrap(), words);
    }
}
