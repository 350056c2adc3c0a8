//! Control-port allocation by random probe.

use rand::Rng;

use crate::error::{GateError, Result};

/// Samples random ports in `[min, max]` and returns the first that binds.
///
/// Probabilistic scan: with an unlucky draw it can exhaust `max_attempts`
/// even though a free port exists in the range. Accepted trade-off; the
/// attempt budget is the only bound.
pub fn allocate_port(min: u16, max: u16, max_attempts: u32) -> Result<u16> {
	let mut rng = rand::rng();
	for _ in 0..max_attempts {
		let port = rng.random_range(min..=max);
		if port_available(port) {
			return Ok(port);
		}
	}
	Err(GateError::PortExhaustion { attempts: max_attempts })
}

pub(crate) fn port_available(port: u16) -> bool {
	std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allocated_port_passed_its_own_probe() {
		let port = allocate_port(20000, 65000, 32).unwrap();
		// Still bindable right after allocation.
		std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
	}

	#[test]
	fn occupied_single_port_range_exhausts() {
		let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let port = listener.local_addr().unwrap().port();

		match allocate_port(port, port, 8) {
			Err(GateError::PortExhaustion { attempts }) => assert_eq!(attempts, 8),
			other => panic!("expected exhaustion, got {other:?}"),
		}
	}

	#[test]
	fn never_returns_a_port_that_failed_the_probe() {
		let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let occupied = listener.local_addr().unwrap().port();
		// A range of one occupied port can only error, never return it.
		assert!(allocate_port(occupied, occupied, 4).is_err());
	}
}
