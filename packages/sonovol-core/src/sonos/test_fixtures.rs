//! Captured NOTIFY bodies, one per event shape the parsers handle.

/// AVTransport NOTIFY while playing a track. The DIDL metadata is escaped
/// twice: once as an attribute value inside LastChange, once for LastChange
/// itself.
pub const AV_TRANSPORT_NOTIFY_PLAYING: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property>
    <LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/AVT/&quot; xmlns:r=&quot;urn:schemas-rinconnetworks-com:metadata-1-0/&quot;&gt;&lt;InstanceID val=&quot;0&quot;&gt;&lt;TransportState val=&quot;PLAYING&quot;/&gt;&lt;CurrentPlayMode val=&quot;NORMAL&quot;/&gt;&lt;CurrentTrackURI val=&quot;x-sonos-spotify:spotify%3atrack%3a123?sid=9&amp;amp;flags=8224&amp;amp;sn=1&quot;/&gt;&lt;CurrentTrackMetaData val=&quot;&amp;lt;DIDL-Lite xmlns:dc=&amp;quot;http://purl.org/dc/elements/1.1/&amp;quot; xmlns:upnp=&amp;quot;urn:schemas-upnp-org:metadata-1-0/upnp/&amp;quot; xmlns=&amp;quot;urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/&amp;quot;&amp;gt;&amp;lt;item id=&amp;quot;-1&amp;quot; parentID=&amp;quot;-1&amp;quot;&amp;gt;&amp;lt;upnp:albumArtURI&amp;gt;/getaa?s=1&amp;amp;amp;u=x-sonos-spotify&amp;lt;/upnp:albumArtURI&amp;gt;&amp;lt;dc:title&amp;gt;Windowlicker&amp;lt;/dc:title&amp;gt;&amp;lt;dc:creator&amp;gt;Aphex Twin&amp;lt;/dc:creator&amp;gt;&amp;lt;upnp:album&amp;gt;Windowlicker&amp;lt;/upnp:album&amp;gt;&amp;lt;/item&amp;gt;&amp;lt;/DIDL-Lite&amp;gt;&quot;/&gt;&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange>
  </e:property>
</e:propertyset>"#;

/// AVTransport NOTIFY for a line-in source.
pub const AV_TRANSPORT_NOTIFY_LINE_IN: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property>
    <LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/AVT/&quot;&gt;&lt;InstanceID val=&quot;0&quot;&gt;&lt;TransportState val=&quot;PLAYING&quot;/&gt;&lt;CurrentTrackURI val=&quot;x-rincon-stream:RINCON_AAAA00000000001400&quot;/&gt;&lt;AVTransportURI val=&quot;x-rincon-stream:RINCON_AAAA00000000001400&quot;/&gt;&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange>
  </e:property>
</e:propertyset>"#;

/// RenderingControl NOTIFY: Master at 42, unmuted, plus a non-Master channel to ignore.
pub const RENDERING_CONTROL_NOTIFY_FULL: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property>
    <LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/RCS/&quot;&gt;
      &lt;InstanceID val=&quot;0&quot;&gt;
        &lt;Volume channel=&quot;Master&quot; val=&quot;42&quot;/&gt;
        &lt;Volume channel=&quot;LF&quot; val=&quot;100&quot;/&gt;
        &lt;Mute channel=&quot;Master&quot; val=&quot;0&quot;/&gt;
      &lt;/InstanceID&gt;
    &lt;/Event&gt;</LastChange>
  </e:property>
</e:propertyset>"#;

/// RenderingControl NOTIFY with muted speaker.
pub const RENDERING_CONTROL_NOTIFY_MUTED: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property>
    <LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/RCS/&quot;&gt;
      &lt;InstanceID val=&quot;0&quot;&gt;
        &lt;Volume channel=&quot;Master&quot; val=&quot;75&quot;/&gt;
        &lt;Mute channel=&quot;Master&quot; val=&quot;1&quot;/&gt;
      &lt;/InstanceID&gt;
    &lt;/Event&gt;</LastChange>
  </e:property>
</e:propertyset>"#;

/// RenderingControl NOTIFY with only volume (no mute change).
pub const RENDERING_CONTROL_NOTIFY_VOLUME_ONLY: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property>
    <LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/RCS/&quot;&gt;
      &lt;InstanceID val=&quot;0&quot;&gt;
        &lt;Volume channel=&quot;Master&quot; val=&quot;100&quot;/&gt;
      &lt;/InstanceID&gt;
    &lt;/Event&gt;</LastChange>
  </e:property>
</e:propertyset>"#;

/// GroupRenderingControl NOTIFY: plain properties, no LastChange.
pub const GROUP_RENDERING_NOTIFY: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><GroupVolume>30</GroupVolume></e:property>
  <e:property><GroupMute>1</GroupMute></e:property>
  <e:property><GroupVolumeChangeable>1</GroupVolumeChangeable></e:property>
</e:propertyset>"#;

/// ZoneGroupTopology NOTIFY: Kitchen + Bath grouped under Kitchen, and a
/// stereo-paired Living Room whose right speaker is invisible.
pub const ZONE_GROUP_TOPOLOGY_NOTIFY: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property>
    <ZoneGroupState>&lt;ZoneGroupState&gt;&lt;ZoneGroups&gt;&lt;ZoneGroup Coordinator=&quot;RINCON_K1400&quot; ID=&quot;RINCON_K1400:1&quot;&gt;&lt;ZoneGroupMember UUID=&quot;RINCON_K1400&quot; Location=&quot;http://192.168.1.20:1400/xml/device_description.xml&quot; ZoneName=&quot;Kitchen&quot;/&gt;&lt;ZoneGroupMember UUID=&quot;RINCON_B1400&quot; Location=&quot;http://192.168.1.21:1400/xml/device_description.xml&quot; ZoneName=&quot;Bath&quot;/&gt;&lt;/ZoneGroup&gt;&lt;ZoneGroup Coordinator=&quot;RINCON_V1400&quot; ID=&quot;RINCON_V1400:2&quot;&gt;&lt;ZoneGroupMember UUID=&quot;RINCON_V1400&quot; Location=&quot;http://192.168.1.30:1400/xml/device_description.xml&quot; ZoneName=&quot;Living Room&quot; ChannelMapSet=&quot;RINCON_V1400:LF,LF;RINCON_S1400:RF,RF&quot;/&gt;&lt;ZoneGroupMember UUID=&quot;RINCON_S1400&quot; Location=&quot;http://192.168.1.31:1400/xml/device_description.xml&quot; ZoneName=&quot;Living Room&quot; Invisible=&quot;1&quot; ChannelMapSet=&quot;RINCON_V1400:LF,LF;RINCON_S1400:RF,RF&quot;/&gt;&lt;/ZoneGroup&gt;&lt;/ZoneGroups&gt;&lt;/ZoneGroupState&gt;</ZoneGroupState>
  </e:property>
</e:propertyset>"#;
