use alloy_primitives::Address;
use keyvault_lib::{
    ConfigStore, KdfProfile, TransactionBroadcaster, WalletConfig, WalletContext, WalletError,
    WalletPaths, WalletResult, WalletStatus, DEFAULT_VAULT_KEY,
};
use secrecy::SecretString;
use tempfile::TempDir;

const ABANDON_PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn password(raw: &str) -> SecretString {
    SecretString::from(raw.to_string())
}

/// Context on `dir` with a cheap KDF so the tests stay fast.
fn open_context(dir: &TempDir) -> WalletResult<WalletContext> {
    let paths = WalletPaths::new(dir.path())?;
    let store = ConfigStore::from_paths(&paths);
    if !store.path().exists() {
        let mut config = WalletConfig::new("development");
        config.kdf = KdfProfile::light();
        store.save(&config)?;
    }
    WalletContext::initialize(dir.path().to_path_buf())
}

fn vault_file(context: &WalletContext) -> std::path::PathBuf {
    context.paths().vault_file(DEFAULT_VAULT_KEY).unwrap()
}

#[test]
fn wrong_password_after_restart_then_correct_password() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");

    let context = open_context(&temp_dir)?;
    assert_eq!(context.unlock(&password("correct-horse"))?, WalletStatus::Empty);
    let created = context.manager().create_wallet(None)?;
    assert_eq!(created.len(), 1);
    let first_key = context.manager().reveal_private_key(0)?;
    assert!(vault_file(&context).exists());
    context.lock();
    drop(context);

    let restarted = open_context(&temp_dir)?;
    let err = restarted
        .unlock(&password("wrong"))
        .expect_err("expected unlock failure");
    assert_eq!(err, WalletError::AuthenticationFailure);
    assert!(matches!(
        restarted.manager().status(),
        WalletStatus::Error { .. }
    ));
    assert!(vault_file(&restarted).exists(), "failed unlock must not clear the vault");

    assert_eq!(
        restarted.unlock(&password("correct-horse"))?,
        WalletStatus::Ready {
            mnemonic_backed: true,
            account_count: 1
        }
    );
    assert_eq!(restarted.manager().accounts()?, created);
    assert_eq!(restarted.manager().reveal_private_key(0)?, first_key);
    Ok(())
}

#[test]
fn eleven_word_import_is_rejected() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");
    let context = open_context(&temp_dir)?;
    context.unlock(&password("correct-horse"))?;

    let eleven: Vec<&str> = ABANDON_PHRASE.split(' ').take(11).collect();
    let err = context
        .manager()
        .import_mnemonic(&eleven.join(" "))
        .expect_err("eleven words must be rejected");
    assert!(matches!(err, WalletError::InvalidMnemonic(_)));
    assert_eq!(context.manager().status(), WalletStatus::Empty);
    assert!(!vault_file(&context).exists());
    Ok(())
}

#[test]
fn delete_then_bootstrap_is_empty() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");
    let context = open_context(&temp_dir)?;
    context.unlock(&password("correct-horse"))?;
    context.manager().import_mnemonic(ABANDON_PHRASE)?;
    context.manager().add_account()?;

    context.manager().delete_wallet()?;
    assert!(!vault_file(&context).exists());
    assert_eq!(context.manager().bootstrap()?, WalletStatus::Empty);
    assert!(context.manager().accounts()?.is_empty());
    Ok(())
}

#[test]
fn key_only_wallet_rejects_add_account() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");
    let context = open_context(&temp_dir)?;
    context.unlock(&password("correct-horse"))?;

    let imported = context.manager().import_private_key(
        "0x501c797c4b1fdfa88fb7efdf7c9871b8e0f46dbc44259e3e270e0d4c938165f5",
    )?;
    let before = std::fs::read(vault_file(&context))?;

    let err = context.manager().add_account().expect_err("key-only add");
    assert!(matches!(err, WalletError::UnsupportedOperation(_)));
    assert_eq!(context.manager().accounts()?, imported);
    assert_eq!(std::fs::read(vault_file(&context))?, before);
    Ok(())
}

#[test]
fn mnemonic_wallet_grows_and_signs() -> WalletResult<()> {
    struct FixedBroadcaster;

    impl TransactionBroadcaster for FixedBroadcaster {
        fn transaction_count(&self, _address: &Address) -> WalletResult<u64> {
            Ok(0)
        }

        fn gas_price(&self) -> WalletResult<u128> {
            Ok(50_000_000_000)
        }

        fn send_raw_transaction(&self, raw: &[u8]) -> WalletResult<String> {
            assert!(!raw.is_empty());
            Ok("0xfeed".to_string())
        }
    }

    let temp_dir = TempDir::new().expect("create temp dir");
    let context = open_context(&temp_dir)?;
    context.unlock(&password("correct-horse"))?;

    let accounts = context.manager().import_mnemonic(ABANDON_PHRASE)?;
    assert_eq!(accounts[0].address, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
    let second = context.manager().add_account()?;
    assert_eq!(second.address, "0x6Fac4D18c912343BF86fa7049364Dd4E424Ab9C0");

    let signer = context.manager().get_signer(1)?;
    assert_eq!(signer.chain_id(), 137);
    let hash = signer.send(&accounts[0].address, "0.01", &FixedBroadcaster)?;
    assert_eq!(
        context.transaction_url(&hash),
        "https://polygonscan.com/tx/0xfeed"
    );

    context.lock();
    assert!(matches!(
        context.manager().get_signer(1),
        Err(WalletError::NoActiveSession)
    ));
    Ok(())
}

#[test]
fn explorer_key_lives_outside_the_vault() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");
    let context = open_context(&temp_dir)?;
    context.save_explorer_api_key("EXPLORER-TOKEN")?;
    drop(context);

    let reopened = open_context(&temp_dir)?;
    assert_eq!(
        reopened.explorer_api_key()?.as_deref(),
        Some("EXPLORER-TOKEN")
    );
    assert!(!reopened.session().is_session_active());
    Ok(())
}

#[test]
fn empty_password_is_rejected() -> WalletResult<()> {
    let temp_dir = TempDir::new().expect("create temp dir");
    let context = open_context(&temp_dir)?;
    assert!(matches!(
        context.unlock(&password("")),
        Err(WalletError::ValidationError(_))
    ));
    assert_eq!(context.manager().status(), WalletStatus::Uninitialized);
    Ok(())
}
