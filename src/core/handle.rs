//! 代际句柄与对象池
//!
//! 每个对象存放在 `Arena` 的一个槽位中，句柄由 (槽位索引, 代数) 组成。
//! 对象被移除时槽位代数加一，旧句柄随即失效，
//! 访问已销毁对象会得到 `HandleError::Stale`，而不是悬垂指针。

use std::fmt;

use super::error::HandleError;

/// 未区分类型的代际句柄
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle {
    index: u32,
    generation: u32,
}

impl RawHandle {
    /// 槽位索引
    pub fn index(&self) -> u32 {
        self.index
    }

    /// 槽位代数
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// 编码为不透明的 64 位整数（高 32 位为代数）
    pub fn to_bits(&self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// 从 64 位整数还原，真实性由 `Arena` 校验
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// 代际对象池
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    /// 创建空的对象池
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// 放入对象，返回其句柄
    pub fn insert(&mut self, value: T) -> RawHandle {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return RawHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        RawHandle {
            index,
            generation: 0,
        }
    }

    /// 校验句柄并返回对象引用
    pub fn get(&self, handle: RawHandle) -> Result<&T, HandleError> {
        let slot = self
            .slots
            .get(handle.index as usize)
            .ok_or(HandleError::Invalid)?;
        if slot.generation != handle.generation {
            return Err(HandleError::Stale);
        }
        slot.value.as_ref().ok_or(HandleError::Stale)
    }

    /// 校验句柄并返回对象可变引用
    pub fn get_mut(&mut self, handle: RawHandle) -> Result<&mut T, HandleError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .ok_or(HandleError::Invalid)?;
        if slot.generation != handle.generation {
            return Err(HandleError::Stale);
        }
        slot.value.as_mut().ok_or(HandleError::Stale)
    }

    /// 移除对象并使所有指向它的句柄失效
    pub fn remove(&mut self, handle: RawHandle) -> Result<T, HandleError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .ok_or(HandleError::Invalid)?;
        if slot.generation != handle.generation || slot.value.is_none() {
            return Err(HandleError::Stale);
        }

        let value = slot.value.take().ok_or(HandleError::Stale)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Ok(value)
    }

    /// 句柄是否仍然有效
    pub fn contains(&self, handle: RawHandle) -> bool {
        self.get(handle).is_ok()
    }

    /// 存活对象数量
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否没有存活对象
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 所有存活对象的句柄
    pub fn handles(&self) -> Vec<RawHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| RawHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");

        assert_eq!(arena.get(a), Ok(&"a"));
        assert_eq!(arena.get(b), Ok(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_removed_handle_is_stale() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Ok(1));

        assert_eq!(arena.get(a), Err(HandleError::Stale));
        assert_eq!(arena.remove(a), Err(HandleError::Stale));
        assert!(arena.is_empty());

        // 槽位被复用，但旧句柄依然无效
        let b = arena.insert(2);
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert_eq!(arena.get(a), Err(HandleError::Stale));
        assert_eq!(arena.get_mut(b).map(|v| *v), Ok(2));
    }

    #[test]
    fn test_unknown_handle_is_invalid() {
        let arena: Arena<u8> = Arena::new();
        assert_eq!(
            arena.get(RawHandle::from_bits(7)),
            Err(HandleError::Invalid)
        );
    }

    #[test]
    fn test_bits_roundtrip_preserves_identity() {
        let mut arena = Arena::new();
        let a = arena.insert(());
        arena.remove(a).unwrap();
        let b = arena.insert(());

        let decoded = RawHandle::from_bits(b.to_bits());
        assert_eq!(decoded, b);
        assert!(arena.contains(decoded));
        assert!(!arena.contains(RawHandle::from_bits(a.to_bits())));
        assert_eq!(arena.handles(), vec![b]);
    }
}
