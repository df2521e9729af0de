//! Host/port normalization for backend and peer addresses.
//!
//! Addresses follow the usual `host:port` conventions: IPv6 literals are bracketed when a port is
//! present, a missing port is filled in from the network default, and an explicit port is never
//! overridden.

use super::BackendError;

/// Separator between entries of a persistent peer list.
pub const PEER_LIST_SEPARATOR: char = ';';

/// Split `host:port`, accepting `[v6-host]:port`.
pub fn split_host_port(hostport: &str) -> Result<(&str, &str), BackendError> {
	let invalid =
		|reason: &str| BackendError::InvalidPeerAddress(format!("{}: {}", hostport, reason));

	let colon = hostport.rfind(':').ok_or_else(|| invalid("missing port in address"))?;

	let (host, host_end) = if hostport.starts_with('[') {
		let end = hostport.find(']').ok_or_else(|| invalid("missing ']' in address"))?;
		if end + 1 == hostport.len() {
			return Err(invalid("missing port in address"));
		}
		if end + 1 != colon {
			return Err(if hostport.as_bytes()[end + 1] == b':' {
				invalid("too many colons in address")
			} else {
				invalid("missing port in address")
			});
		}
		(&hostport[1..end], end + 1)
	} else {
		let host = &hostport[..colon];
		if host.contains(':') {
			return Err(invalid("too many colons in address"));
		}
		(host, colon)
	};

	let after_first = hostport.char_indices().nth(1).map_or("", |(i, _)| &hostport[i..]);
	if after_first.contains('[') {
		return Err(invalid("unexpected '[' in address"));
	}
	if hostport[host_end..].contains(']') || (!hostport.starts_with('[') && host.contains(']')) {
		return Err(invalid("unexpected ']' in address"));
	}

	Ok((host, &hostport[colon + 1..]))
}

/// Join host and port, bracketing hosts that contain a colon.
pub fn join_host_port(host: &str, port: &str) -> String {
	if host.contains(':') {
		format!("[{}]:{}", host, port)
	} else {
		format!("{}:{}", host, port)
	}
}

/// Normalize `addr` into `host:port`, appending `default_port` only when no port is present.
///
/// # Errors
/// Returns `BackendError::InvalidPeerAddress` when the address cannot be split even after adding
/// the default port, when the host is empty, or when the port is not a valid port number. The
/// error describes the original input.
pub fn normalize_address(addr: &str, default_port: u16) -> Result<String, BackendError> {
	let normalized = match split_host_port(addr) {
		Ok((host, port)) => join_host_port(host, port),
		Err(original) => {
			let with_port = join_host_port(addr, &default_port.to_string());
			if split_host_port(&with_port).is_err() {
				return Err(original);
			}
			with_port
		}
	};

	let (host, port) = split_host_port(&normalized)?;
	if host.trim().is_empty() {
		return Err(BackendError::InvalidPeerAddress(format!(
			"{}: missing host in address",
			addr
		)));
	}
	if port.parse::<u16>().is_err() {
		return Err(BackendError::InvalidPeerAddress(format!(
			"{}: invalid port {:?}",
			addr, port
		)));
	}

	Ok(normalized)
}

/// Parse a `;`-separated peer list, normalizing every entry.
///
/// The list is all-or-nothing: the first malformed entry fails the whole parse. An empty input
/// yields an empty list.
pub fn parse_peer_list(peers: &str, default_port: u16) -> Result<Vec<String>, BackendError> {
	if peers.is_empty() {
		return Ok(Vec::new());
	}

	peers
		.split(PEER_LIST_SEPARATOR)
		.map(|peer| normalize_address(peer, default_port))
		.collect()
}
