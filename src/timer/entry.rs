//! 定时器节点、句柄与槽位链表
//! Timer nodes, handles and slot lists

use super::{SEQ_LIMIT, TICK_MASK};

/// Opaque cancellation token: `due_tick << 24 | sequence_id`. Zero means "no timer".
/// 不透明的取消令牌：`due_tick << 24 | sequence_id`。零表示"没有定时器"。
pub type TimerId = u64;

const SEQ_BITS: u32 = 24;
const SEQ_MASK: u64 = 0x00FF_FFFF;

pub(super) fn pack(due_tick: u64, seq: u32) -> TimerId {
    ((due_tick & TICK_MASK) << SEQ_BITS) | (seq as u64 & SEQ_MASK)
}

pub(super) fn unpack(id: TimerId) -> (u64, u32) {
    (id >> SEQ_BITS, (id & SEQ_MASK) as u32)
}

/// Next value of the cycling sequence counter, skipping 0.
pub(super) fn next_seq(current: u32) -> u32 {
    let next = current.wrapping_add(1);
    if next == 0 || next >= SEQ_LIMIT { 1 } else { next }
}

/// A scheduled timer, linked into exactly one slot list while pending.
/// 已调度的定时器，挂起期间恰好链接在一个槽位链表中。
#[derive(Debug)]
pub(super) struct TimerNode<H> {
    pub(super) seq: u32,
    pub(super) due_tick: u64,
    pub(super) payload: Option<H>,
    pub(super) next: Option<usize>,
}

/// Arena of timer nodes with a free list; released nodes are reused.
/// 带空闲链表的定时器节点池；释放的节点会被复用。
#[derive(Debug)]
pub(super) struct TimerPool<H> {
    nodes: Vec<TimerNode<H>>,
    free: Vec<usize>,
}

impl<H> TimerPool<H> {
    pub(super) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(super) fn acquire(&mut self, seq: u32, due_tick: u64, payload: H) -> usize {
        let node = TimerNode {
            seq,
            due_tick,
            payload: Some(payload),
            next: None,
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Returns the node to the free list and hands back its payload.
    /// 将节点归还空闲链表并返回其负载。
    pub(super) fn release(&mut self, idx: usize) -> Option<H> {
        let node = &mut self.nodes[idx];
        node.next = None;
        node.seq = 0;
        let payload = node.payload.take();
        self.free.push(idx);
        payload
    }

    pub(super) fn node(&self, idx: usize) -> &TimerNode<H> {
        &self.nodes[idx]
    }

    /// Number of nodes ever allocated (live plus pooled).
    pub(super) fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub(super) fn pooled(&self) -> usize {
        self.free.len()
    }

    pub(super) fn push_back(&mut self, list: &mut SlotList, idx: usize) {
        self.nodes[idx].next = None;
        match list.tail {
            Some(tail) => self.nodes[tail].next = Some(idx),
            None => list.head = Some(idx),
        }
        list.tail = Some(idx);
        list.len += 1;
    }

    pub(super) fn pop_front(&mut self, list: &mut SlotList) -> Option<usize> {
        let head = list.head?;
        list.head = self.nodes[head].next.take();
        if list.head.is_none() {
            list.tail = None;
        }
        list.len -= 1;
        Some(head)
    }

    /// Unlinks the node matching `(due_tick, seq)`.
    /// 移除匹配 `(due_tick, seq)` 的节点。
    pub(super) fn unlink(&mut self, list: &mut SlotList, due_tick: u64, seq: u32) -> Option<usize> {
        let mut prev: Option<usize> = None;
        let mut cursor = list.head;
        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            if node.seq == seq && node.due_tick & TICK_MASK == due_tick {
                let next = node.next;
                match prev {
                    Some(p) => self.nodes[p].next = next,
                    None => list.head = next,
                }
                if list.tail == Some(idx) {
                    list.tail = prev;
                }
                self.nodes[idx].next = None;
                list.len -= 1;
                return Some(idx);
            }
            prev = cursor;
            cursor = node.next;
        }
        None
    }
}

/// A singly linked list of pool indices.
/// 由节点池索引构成的单向链表。
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct SlotList {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl SlotList {
    pub(super) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    /// Detaches the whole list, leaving this one empty.
    pub(super) fn take(&mut self) -> SlotList {
        std::mem::take(self)
    }
}
