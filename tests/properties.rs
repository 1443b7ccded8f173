use meshdecode::{
    open_channel, open_direct, seal_channel, seal_direct_with_nonce, Ccm, CcmError, ChannelKey,
    DecodeError, DirectTrailer, PrivateKey,
};
use proptest::prelude::*;

fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 16),
        proptest::collection::vec(any::<u8>(), 32),
    ]
}

fn arb_nonce() -> impl Strategy<Value = [u8; 13]> {
    any::<[u8; 13]>()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    // open(seal(m)) == m for every non-empty message
    #[test]
    fn ccm_roundtrip(
        key in arb_key(),
        nonce in arb_nonce(),
        message in proptest::collection::vec(any::<u8>(), 1..=500),
        aad in proptest::collection::vec(any::<u8>(), 0..40),
    ) {
        let ccm = Ccm::for_mesh(&key).unwrap();
        let sealed = ccm.seal(&nonce, &message, &aad).unwrap();
        prop_assert_eq!(sealed.len(), message.len() + ccm.tag_size());

        let (ciphertext, tag) = sealed.split_at(message.len());
        prop_assert_eq!(ccm.open(&nonce, ciphertext, tag, &aad).unwrap(), message);
    }

    // Any single bit flip in ciphertext or tag is rejected.
    #[test]
    fn ccm_detects_tampering(
        key in arb_key(),
        nonce in arb_nonce(),
        message in proptest::collection::vec(any::<u8>(), 1..=200),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let ccm = Ccm::for_mesh(&key).unwrap();
        let mut sealed = ccm.seal(&nonce, &message, &[]).unwrap();
        let at = position.index(sealed.len());
        sealed[at] ^= 1 << bit;

        let (ciphertext, tag) = sealed.split_at(message.len());
        prop_assert_eq!(
            ccm.open(&nonce, ciphertext, tag, &[]),
            Err(CcmError::AuthenticationFailed)
        );
    }

    // Opening with different AAD fails.
    #[test]
    fn ccm_binds_aad(
        key in arb_key(),
        nonce in arb_nonce(),
        message in proptest::collection::vec(any::<u8>(), 1..=64),
        aad in proptest::collection::vec(any::<u8>(), 0..32),
        other in proptest::collection::vec(any::<u8>(), 0..32),
    ) {
        prop_assume!(aad != other);
        let ccm = Ccm::for_mesh(&key).unwrap();
        let sealed = ccm.seal(&nonce, &message, &aad).unwrap();
        let (ciphertext, tag) = sealed.split_at(message.len());
        prop_assert_eq!(
            ccm.open(&nonce, ciphertext, tag, &other),
            Err(CcmError::AuthenticationFailed)
        );
    }

    // A different nonce never opens the packet.
    #[test]
    fn ccm_binds_nonce(
        key in arb_key(),
        nonce in arb_nonce(),
        other in arb_nonce(),
        message in proptest::collection::vec(any::<u8>(), 1..=64),
    ) {
        prop_assume!(nonce != other);
        let ccm = Ccm::for_mesh(&key).unwrap();
        let sealed = ccm.seal(&nonce, &message, &[]).unwrap();
        let (ciphertext, tag) = sealed.split_at(message.len());
        prop_assert!(ccm.open(&other, ciphertext, tag, &[]).is_err());
    }

    #[test]
    fn channel_path_is_self_inverse(
        psk in prop_oneof![
            (1u8..=10).prop_map(|n| vec![n]),
            proptest::collection::vec(any::<u8>(), 16),
            proptest::collection::vec(any::<u8>(), 32),
        ],
        packet_id in any::<u32>(),
        sender in any::<u32>(),
        message in proptest::collection::vec(any::<u8>(), 0..300),
    ) {
        let key = ChannelKey::from_psk(&psk).unwrap();
        let sealed = seal_channel(&key, packet_id, sender, &message).unwrap();
        prop_assert_eq!(sealed.len(), message.len());
        prop_assert_eq!(open_channel(&key, packet_id, sender, &sealed).unwrap(), message);
    }

    #[test]
    fn direct_roundtrip(
        alice in any::<[u8; 32]>(),
        bob in any::<[u8; 32]>(),
        packet_id in any::<u32>(),
        sender in any::<u32>(),
        extra_nonce in any::<u32>(),
        message in proptest::collection::vec(any::<u8>(), 1..=200),
    ) {
        let alice = PrivateKey::from_bytes(alice);
        let bob = PrivateKey::from_bytes(bob);

        let sealed = seal_direct_with_nonce(
            packet_id, sender, &alice, &bob.public_key(), &message, extra_nonce,
        ).unwrap();
        let trailer = DirectTrailer::split(&sealed).unwrap();
        prop_assert_eq!(trailer.extra_nonce, extra_nonce);

        let opened = open_direct(packet_id, sender, &bob, &alice.public_key(), &trailer).unwrap();
        prop_assert_eq!(opened, message);
    }

    #[test]
    fn short_direct_payloads_are_rejected(
        payload in proptest::collection::vec(any::<u8>(), 0..=12),
    ) {
        prop_assert_eq!(
            DirectTrailer::split(&payload),
            Err(DecodeError::InvalidTrailerLength(payload.len()))
        );
    }
}
