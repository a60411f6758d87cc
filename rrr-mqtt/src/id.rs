/// Packet-identifier allocator for QoS 1/2 exchanges. Clients are allotted
/// all even numbers up to `u16::MAX`, brokers the odd numbers, so the two
/// sides can never hand out a colliding id without coordination.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    last: u16,
    in_use: Vec<bool>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IdGenType {
    Client,
    Broker,
}

impl IdGenerator {
    pub fn new(kind: IdGenType) -> Self {
        let last = if kind == IdGenType::Client { u16::MAX } else { u16::MAX - 1 };
        return Self {
            last,
            in_use: vec![false; u16::MAX as usize + 1],
        };
    }

    pub fn flush(&mut self) {
        self.in_use.iter_mut().for_each(|slot| *slot = false);
    }

    pub fn is_set(&self, idx: u16) -> bool {
        self.in_use[idx as usize]
    }

    pub fn set_id(&mut self, idx: u16) {
        self.in_use[idx as usize] = true;
    }

    /// Registers `id` as available again.
    pub fn free_id(&mut self, id: u16) {
        self.in_use[id as usize] = false;
    }

    /// Returns the next available id without reserving it.
    pub fn next_id(&mut self) -> Option<u16> {
        let mut idx = checked_incr(self.last);
        loop {
            if idx == 0 {
                idx = checked_incr(idx);
                continue;
            }
            if idx == self.last {
                return None;
            }
            if !self.is_set(idx) {
                self.last = idx;
                return Some(idx);
            }
            idx = checked_incr(idx);
        }
    }

    /// Returns and reserves the next available id.
    pub fn next_persistent_id(&mut self) -> Option<u16> {
        self.next_id().inspect(|&idx| self.set_id(idx))
    }
}

fn checked_incr(int: u16) -> u16 {
    match int.checked_add(2) {
        Some(idx) => idx,
        None => int % 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_broker_use_disjoint_parities() {
        let mut broker = IdGenerator::new(IdGenType::Broker);
        assert_eq!(broker.next_persistent_id(), Some(2));

        let mut client = IdGenerator::new(IdGenType::Client);
        assert_eq!(client.next_persistent_id(), Some(1));
    }

    #[test]
    fn exhaustion_then_free_recycles_ids() {
        let mut gen = IdGenerator::new(IdGenType::Broker);
        for _ in 0..=u16::MAX / 2 {
            gen.next_persistent_id();
        }
        assert_eq!(gen.next_id(), None);

        gen.free_id(2);
        assert_eq!(gen.next_persistent_id(), Some(2));
    }
}
