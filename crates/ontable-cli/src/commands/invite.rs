use ontable_core::room::{Invitation, JoinCode};

use crate::error::CliError;

/// Encode a code (and optional host name) as a link, or decode a link.
pub fn run_invite(
    code: Option<&str>,
    host: Option<&str>,
    decode: Option<&str>,
) -> Result<String, CliError> {
    let output = if let Some(link) = decode {
        let invitation = Invitation::decode(link)?;
        match invitation.host_name {
            Some(host) => format!("code: {}\nhost: {host}", invitation.code),
            None => format!("code: {}", invitation.code),
        }
    } else {
        let code = JoinCode::parse(code.unwrap_or_default())
            .map_err(ontable_core::room::InvitationError::from)?;
        let invitation = Invitation {
            code,
            host_name: host.map(str::to_string),
        };
        invitation.encode()
    };

    println!("{output}");
    Ok(output)
}
