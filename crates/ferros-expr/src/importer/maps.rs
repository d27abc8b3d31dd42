//! Namespace and interface equivalence maps.
//!
//! A map lists every per-image declaration that stands for one logical
//! namespace (or interface) of a destination store. Maps only grow: entries are
//! never removed, and the images already asked are remembered so a later
//! completion for the same name does not search them again.

use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{AstId, DeclId};
use crate::images::{Image, ImageId};

/// One image's declaration of a namespace.
#[derive(Debug, Clone)]
pub struct NamespaceEntry
{
    pub image: Rc<Image>,
    pub namespace: DeclId,
}

/// Every image namespace one namespace copy stands for, in discovery order,
/// plus the images already searched for it.
#[derive(Debug, Clone, Default)]
pub struct NamespaceMap
{
    entries: Vec<NamespaceEntry>,
    searched: HashSet<ImageId>,
}

impl NamespaceMap
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Append an entry unless the same image already supplied the same namespace.
    ///
    /// Returns whether the map grew.
    pub fn push(&mut self, image: Rc<Image>, namespace: DeclId) -> bool
    {
        let duplicate = self
            .entries
            .iter()
            .any(|entry| entry.image.id() == image.id() && entry.namespace == namespace);
        if duplicate {
            return false;
        }
        self.entries.push(NamespaceEntry { image, namespace });
        true
    }

    /// Remember that `image` has been searched, whether or not it matched.
    ///
    /// Returns `false` if it had already been searched.
    pub fn mark_searched(&mut self, image: ImageId) -> bool
    {
        self.searched.insert(image)
    }

    #[must_use]
    pub fn was_searched(&self, image: ImageId) -> bool
    {
        self.searched.contains(&image)
    }

    /// Union `other` into this map, keeping the order of existing entries.
    pub fn merge(&mut self, other: &NamespaceMap)
    {
        for entry in &other.entries {
            self.push(entry.image.clone(), entry.namespace);
        }
        self.searched.extend(other.searched.iter().copied());
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamespaceEntry>
    {
        self.entries.iter()
    }

    /// Drop the entries of an image store that is being torn down.
    pub(crate) fn forget_ast(&mut self, ast: AstId)
    {
        self.entries.retain(|entry| entry.image.ast() != ast);
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

/// One image's declaration of an interface.
#[derive(Debug, Clone)]
pub struct InterfaceEntry
{
    pub image: Rc<Image>,
    /// Store of `image`, kept so entries can be dropped once it is destroyed.
    pub ast: AstId,
    pub interface: DeclId,
}

/// Every image interface one interface copy stands for.
#[derive(Debug, Clone, Default)]
pub struct InterfaceMap
{
    entries: Vec<InterfaceEntry>,
}

impl InterfaceMap
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn push(&mut self, image: Rc<Image>, interface: DeclId) -> bool
    {
        let ast = image.ast();
        if self
            .entries
            .iter()
            .any(|entry| entry.ast == ast && entry.interface == interface)
        {
            return false;
        }
        self.entries.push(InterfaceEntry { image, ast, interface });
        true
    }

    pub fn merge(&mut self, other: &InterfaceMap)
    {
        for entry in &other.entries {
            self.push(entry.image.clone(), entry.interface);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterfaceEntry>
    {
        self.entries.iter()
    }

    pub(crate) fn forget_ast(&mut self, ast: AstId)
    {
        self.entries.retain(|entry| entry.ast != ast);
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}
