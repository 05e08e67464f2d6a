use super::SignTarget;
use quorate::principals::FounderKey;
use std::fs;
use std::path::Path;

/// Write a fresh hex PKCS#8 key to `out` and print its public half.
pub fn keygen(out: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if out.exists() && !force {
        return Err(format!(
            "key file '{}' already exists (use --force to overwrite)",
            out.display()
        )
        .into());
    }

    let key = FounderKey::generate()?;
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(out, key.pkcs8_hex().as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(out, fs::Permissions::from_mode(0o600))?;
    }

    println!("✅ Signing key written to {}", out.display());
    println!("Public key: {}", key.public_key_hex());
    Ok(())
}

pub fn sign(key_path: &Path, target: SignTarget) -> Result<(), Box<dyn std::error::Error>> {
    let key = load_key(key_path)?;
    let signature = match target {
        SignTarget::Vote {
            proposal_id,
            founder,
            reject,
        } => key.sign_ballot(&proposal_id, &founder, !reject),
        SignTarget::Endorse {
            invitation_id,
            founder,
        } => key.sign_endorsement(&invitation_id, &founder),
    };
    println!("{}", signature);
    Ok(())
}

fn load_key(path: &Path) -> Result<FounderKey, Box<dyn std::error::Error>> {
    let contents = zeroize::Zeroizing::new(
        fs::read_to_string(path)
            .map_err(|e| format!("cannot read key file '{}': {}", path.display(), e))?,
    );
    Ok(FounderKey::from_pkcs8_hex(contents.trim())?)
}
