use std::net::{IpAddr, UdpSocket};

use tracing::debug;

// connecting a UDP socket sends nothing, it only picks a route
pub fn outbound_ip() -> Option<IpAddr> {
    let probe = UdpSocket::bind(("0.0.0.0", 0)).and_then(|socket| {
        socket.connect(("8.8.8.8", 80))?;
        socket.local_addr()
    });

    match probe {
        Ok(addr) if !addr.ip().is_unspecified() => Some(addr.ip()),
        Ok(_) => None,
        Err(err) => {
            debug!("could not determine outbound address: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_ip_is_never_unspecified() {
        if let Some(ip) = outbound_ip() {
            assert!(!ip.is_unspecified());
        }
    }
}
